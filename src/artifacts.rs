//! Side-channel artifacts handed from Fetch to Index.
//!
//! Two named slots in a directory:
//!
//! - `tree_summary.json`: the model's hierarchical description of the file
//!   tree, or its raw text when the reply was not JSON.
//! - `chunks_raw.json`: the fetched files as `[{"path", "content"}]`.
//!
//! Presence is a plain existence test; nothing is validated until Index
//! loads the files.

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::models::FetchedFile;

pub const TREE_SUMMARY_FILE: &str = "tree_summary.json";
pub const RAW_FILES_FILE: &str = "chunks_raw.json";

/// A node of the summarised file tree.
///
/// An object carrying a `"type"` key is a file with metadata; any other
/// object is a directory; any non-object value is a file without metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TreeNode {
    File(Map<String, Value>),
    Directory(BTreeMap<String, TreeNode>),
    Bare(Value),
}

impl TreeNode {
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) if map.contains_key("type") => TreeNode::File(map),
            Value::Object(map) => TreeNode::Directory(
                map.into_iter()
                    .map(|(name, child)| (name, TreeNode::from_value(child)))
                    .collect(),
            ),
            other => TreeNode::Bare(other),
        }
    }

    fn flatten_into(&self, path: String, out: &mut BTreeMap<String, Map<String, Value>>) {
        match self {
            TreeNode::File(meta) => {
                out.insert(path, meta.clone());
            }
            TreeNode::Bare(_) => {
                out.insert(path, Map::new());
            }
            TreeNode::Directory(children) => {
                for (name, child) in children {
                    child.flatten_into(join(&path, name), out);
                }
            }
        }
    }
}

impl<'de> Deserialize<'de> for TreeNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(TreeNode::from_value)
    }
}

fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}

/// The tree summary artifact.
#[derive(Debug, Clone, PartialEq)]
pub enum TreeSummary {
    Structured(BTreeMap<String, TreeNode>),
    /// The model reply was not a JSON object; kept verbatim.
    Raw(String),
}

impl TreeSummary {
    /// Interpret a model reply (or artifact contents).
    pub fn parse(text: &str) -> Self {
        match serde_json::from_str::<Value>(crate::llm::strip_code_fence(text)) {
            Ok(Value::Object(map)) => TreeSummary::Structured(
                map.into_iter()
                    .map(|(k, v)| (k, TreeNode::from_value(v)))
                    .collect(),
            ),
            _ => TreeSummary::Raw(text.to_string()),
        }
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, TreeSummary::Structured(_))
    }

    /// Flat `path → metadata` mapping. A raw summary has no metadata.
    pub fn flatten(&self) -> BTreeMap<String, Map<String, Value>> {
        let mut out = BTreeMap::new();
        if let TreeSummary::Structured(roots) = self {
            for (name, node) in roots {
                node.flatten_into(name.clone(), &mut out);
            }
        }
        out
    }

    fn to_text(&self) -> Result<String> {
        Ok(match self {
            TreeSummary::Structured(roots) => serde_json::to_string_pretty(roots)?,
            TreeSummary::Raw(text) => text.clone(),
        })
    }
}

/// Directory holding the two artifact slots.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn tree_summary_path(&self) -> PathBuf {
        self.dir.join(TREE_SUMMARY_FILE)
    }

    pub fn raw_files_path(&self) -> PathBuf {
        self.dir.join(RAW_FILES_FILE)
    }

    /// Both slots exist.
    pub fn is_complete(&self) -> bool {
        self.tree_summary_path().exists() && self.raw_files_path().exists()
    }

    pub fn write_tree_summary(&self, summary: &TreeSummary) -> Result<()> {
        self.write(&self.tree_summary_path(), &summary.to_text()?)
    }

    pub fn write_files(&self, files: &[FetchedFile]) -> Result<()> {
        self.write(&self.raw_files_path(), &serde_json::to_string_pretty(files)?)
    }

    pub fn read_tree_summary(&self) -> Result<TreeSummary> {
        let path = self.tree_summary_path();
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(TreeSummary::parse(&text))
    }

    pub fn read_files(&self) -> Result<Vec<FetchedFile>> {
        let path = self.raw_files_path();
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("Malformed {}", path.display()))
    }

    fn write(&self, path: &Path, contents: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write {}", path.display()))
    }
}
