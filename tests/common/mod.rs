//! Fakes for the capability traits, shared by the integration tests.

#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gitsurfer::artifacts::ArtifactStore;
use gitsurfer::config::Config;
use gitsurfer::conversation::Services;
use gitsurfer::embedding::Embedder;
use gitsurfer::error::FetchError;
use gitsurfer::github::RepoSource;
use gitsurfer::llm::{ChatModel, CompletionOptions};
use gitsurfer::models::{Message, RepoLocator, TreeEntry};
use gitsurfer::prompts;
use gitsurfer::provider::{ProviderKind, Providers};
use gitsurfer::store::InMemoryVectorStore;

/// Defaults with no backoff sleeps and all paths under `dir`.
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.github.backoff_base_ms = 0;
    config.paths.artifacts_dir = dir.join("temp");
    config.paths.store_dir = dir.join("DATA");
    config
}

// ─── Repository ─────────────────────────────────────────────────────

/// In-memory repository with optional per-file failures and latency.
#[derive(Default)]
pub struct FakeRepo {
    tree: Vec<TreeEntry>,
    files: HashMap<String, String>,
    failing: HashSet<String>,
    tree_status: Option<u16>,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    attempts: Mutex<HashMap<String, usize>>,
    tree_calls: AtomicUsize,
}

impl FakeRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: &str, content: &str) -> Self {
        self.tree.push(TreeEntry::blob(path));
        self.files.insert(path.to_string(), content.to_string());
        self
    }

    pub fn with_dir(mut self, path: &str) -> Self {
        self.tree.push(TreeEntry::tree(path));
        self
    }

    /// A blob that fails on every attempt.
    pub fn with_failing_file(mut self, path: &str) -> Self {
        self.tree.push(TreeEntry::blob(path));
        self.failing.insert(path.to_string());
        self
    }

    pub fn with_tree_status(mut self, status: u16) -> Self {
        self.tree_status = Some(status);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn attempts(&self, path: &str) -> usize {
        self.attempts
            .lock()
            .unwrap()
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    pub fn tree_calls(&self) -> usize {
        self.tree_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RepoSource for FakeRepo {
    async fn list_tree(&self, _locator: &RepoLocator) -> Result<Vec<TreeEntry>, FetchError> {
        self.tree_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = self.tree_status {
            return Err(FetchError::Network {
                what: "tree".to_string(),
                status,
                body: "Not Found".to_string(),
            });
        }
        Ok(self.tree.clone())
    }

    async fn fetch_file(&self, _locator: &RepoLocator, path: &str) -> Result<String, FetchError> {
        *self
            .attempts
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default() += 1;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(path) {
            return Err(FetchError::Network {
                what: path.to_string(),
                status: 500,
                body: "boom".to_string(),
            });
        }
        self.files.get(path).cloned().ok_or_else(|| FetchError::Network {
            what: path.to_string(),
            status: 404,
            body: "Not Found".to_string(),
        })
    }
}

// ─── Chat model ─────────────────────────────────────────────────────

/// Answers by looking at which system prompt opens the conversation.
pub struct ScriptedChat {
    pub tree_reply: String,
    pub plan: Vec<String>,
    pub queries: Option<Vec<String>>,
    pub answer: String,
    pub fail_respond: bool,
    pub fail_summary: bool,
    pub calls: Mutex<Vec<&'static str>>,
}

impl Default for ScriptedChat {
    fn default() -> Self {
        Self {
            tree_reply: json!({"README.md": {"type": "file", "size": 5}}).to_string(),
            plan: vec!["What does the README say?".into()],
            queries: None,
            answer: "The README says Hello.".into(),
            fail_respond: false,
            fail_summary: false,
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedChat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self, kind: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|k| **k == kind).count()
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, messages: &[Message], _opts: &CompletionOptions) -> Result<String> {
        let system = messages.first().map(|m| m.content.as_str()).unwrap_or("");
        let kind = if system.starts_with(prompts::SUMMARIZE_STRUCTURE) {
            "summary"
        } else if system.starts_with(prompts::RESEARCH_PLAN) {
            "plan"
        } else if system.starts_with(prompts::GENERATE_QUERIES) {
            "queries"
        } else {
            "respond"
        };
        self.calls.lock().unwrap().push(kind);

        match kind {
            "summary" if self.fail_summary => bail!("summary unavailable"),
            "summary" => Ok(self.tree_reply.clone()),
            "plan" => Ok(json!({ "steps": self.plan }).to_string()),
            "queries" => {
                let question = messages
                    .iter()
                    .find(|m| m.role == gitsurfer::models::Role::User)
                    .map(|m| m.content.clone())
                    .unwrap_or_default();
                let queries = self.queries.clone().unwrap_or_else(|| vec![question]);
                Ok(json!({ "queries": queries }).to_string())
            }
            _ if self.fail_respond => bail!("model overloaded"),
            _ => Ok(self.answer.clone()),
        }
    }
}

// ─── Embedder ───────────────────────────────────────────────────────

/// Letter-frequency vectors: deterministic and similar for similar text.
#[derive(Default)]
pub struct FakeEmbedder {
    calls: AtomicUsize,
    /// Every call from this 1-based call number onward fails.
    fail_from: Option<usize>,
}

impl FakeEmbedder {
    pub fn failing_from(call: usize) -> Self {
        Self {
            fail_from: Some(call),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn letter_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; 27];
    v[26] = 1.0;
    for c in text.to_lowercase().chars() {
        if c.is_ascii_lowercase() {
            v[(c as u8 - b'a') as usize] += 1.0;
        }
    }
    v
}

#[async_trait]
impl Embedder for FakeEmbedder {
    fn model_name(&self) -> &str {
        "letters"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_from.is_some_and(|from| n >= from) {
            bail!("embedding service unavailable");
        }
        Ok(texts.iter().map(|t| letter_vector(t)).collect())
    }
}

// ─── Wiring ─────────────────────────────────────────────────────────

pub fn providers(chat: Arc<ScriptedChat>, embedder: Arc<FakeEmbedder>) -> Providers {
    let mut providers = Providers::new();
    providers.register_chat(ProviderKind::Gemini, chat);
    providers.register_embedder(ProviderKind::Gemini, embedder);
    providers
}

pub fn services(
    config: &Config,
    repo: Arc<FakeRepo>,
    chat: Arc<ScriptedChat>,
    embedder: Arc<FakeEmbedder>,
) -> Services {
    Services::new(
        repo,
        providers(chat, embedder),
        Arc::new(InMemoryVectorStore::new()),
        ArtifactStore::new(&config.paths.artifacts_dir),
    )
}

pub fn hello_world() -> FakeRepo {
    FakeRepo::new().with_file("README.md", "Hello")
}
