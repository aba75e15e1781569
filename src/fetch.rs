//! Fetch orchestrator.
//!
//! Pulls one repository down into the artifact store:
//!
//! ```text
//! FetchTree ──▶ SummarizeTree ──▶ FetchFiles ──▶ Done
//! ```
//!
//! - **FetchTree** lists the tree once. A failure here is the only error
//!   that leaves this orchestrator.
//! - **SummarizeTree** asks the model for a hierarchical JSON description of
//!   the (truncated) path list. A reply that is not JSON is kept as raw text;
//!   the summary only enriches metadata and never fails the fetch.
//! - **FetchFiles** fetches every blob with at most `github.concurrency`
//!   requests in flight, retrying each with exponential backoff. Files that
//!   still fail, or that are empty, are dropped.
//!
//! Both artifacts are written before [`FetchOrchestrator::run`] returns.

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::artifacts::{ArtifactStore, TreeSummary};
use crate::config::Config;
use crate::error::FetchError;
use crate::github::RepoSource;
use crate::llm::{ChatModel, CompletionOptions};
use crate::models::{FetchedFile, Message, RepoLocator, TreeEntry};
use crate::progress::{FetchProgressEvent, FetchProgressReporter, NoProgress};
use crate::prompts;
use crate::retry::{retry_with_backoff, Backoff};

const TRUNCATION_MARKER: &str = "\n... (truncated)";

/// Steps of the fetch machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStep {
    FetchTree,
    SummarizeTree,
    FetchFiles,
    Done,
}

/// Snapshot threaded through the fetch steps.
#[derive(Debug, Clone)]
pub struct FetchState {
    pub locator: RepoLocator,
    pub tree: Vec<TreeEntry>,
    pub tree_summary: Option<TreeSummary>,
    /// `None` until FetchFiles has run; possibly empty afterwards.
    pub files: Option<Vec<FetchedFile>>,
}

impl FetchState {
    pub fn new(locator: RepoLocator) -> Self {
        Self {
            locator,
            tree: Vec::new(),
            tree_summary: None,
            files: None,
        }
    }
}

/// Include/exclude globs over blob paths. No include globs admits everything.
#[derive(Debug, Clone)]
pub struct PathFilter {
    include: Option<GlobSet>,
    exclude: GlobSet,
}

impl PathFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        let include = if include.is_empty() {
            None
        } else {
            Some(build_globset(include)?)
        };
        Ok(Self {
            include,
            exclude: build_globset(exclude)?,
        })
    }

    pub fn admits(&self, path: &str) -> bool {
        !self.exclude.is_match(path) && self.include.as_ref().map_or(true, |g| g.is_match(path))
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

pub struct FetchOrchestrator {
    config: Arc<Config>,
    source: Arc<dyn RepoSource>,
    chat: Arc<dyn ChatModel>,
    artifacts: ArtifactStore,
    filter: PathFilter,
    progress: Arc<dyn FetchProgressReporter>,
    options: CompletionOptions,
}

impl FetchOrchestrator {
    pub fn new(
        config: Arc<Config>,
        source: Arc<dyn RepoSource>,
        chat: Arc<dyn ChatModel>,
        artifacts: ArtifactStore,
    ) -> Result<Self> {
        let filter = PathFilter::new(&config.github.include_globs, &config.github.exclude_globs)?;
        Ok(Self {
            config,
            source,
            chat,
            artifacts,
            filter,
            progress: Arc::new(NoProgress),
            options: CompletionOptions::default(),
        })
    }

    pub fn with_progress(mut self, progress: Arc<dyn FetchProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_options(mut self, options: CompletionOptions) -> Self {
        self.options = options;
        self
    }

    /// Run all steps for `locator`.
    pub async fn run(&self, locator: &RepoLocator) -> Result<FetchState, FetchError> {
        let mut state = FetchState::new(locator.clone());
        let mut step = FetchStep::FetchTree;

        while step != FetchStep::Done {
            tracing::debug!(repo = %locator, ?step, "fetch step");
            step = match step {
                FetchStep::FetchTree => {
                    state.tree = self.fetch_tree(&state.locator).await?;
                    FetchStep::SummarizeTree
                }
                FetchStep::SummarizeTree => {
                    state.tree_summary = Some(self.summarize_tree(&state.tree).await?);
                    FetchStep::FetchFiles
                }
                FetchStep::FetchFiles => {
                    state.files = Some(self.fetch_files(&state.locator, &state.tree).await?);
                    FetchStep::Done
                }
                FetchStep::Done => FetchStep::Done,
            };
        }

        Ok(state)
    }

    pub async fn fetch_tree(&self, locator: &RepoLocator) -> Result<Vec<TreeEntry>, FetchError> {
        self.progress.report(FetchProgressEvent::Listing {
            repo: locator.to_string(),
        });
        let tree = self.source.list_tree(locator).await.map_err(|e| {
            tracing::error!(repo = %locator, error = %e, "tree listing failed");
            e
        })?;
        tracing::info!(repo = %locator, entries = tree.len(), "fetched tree");
        Ok(tree)
    }

    /// Summarise the tree with the model and persist the summary artifact.
    pub async fn summarize_tree(&self, tree: &[TreeEntry]) -> Result<TreeSummary, FetchError> {
        let tree_text = tree_text(tree, self.config.summary.max_tree_chars);
        let messages = [
            Message::system(prompts::SUMMARIZE_STRUCTURE),
            Message::user(format!("FILE TREE:\n{}", tree_text)),
        ];

        let summary = match self.chat.complete(&messages, &self.options).await {
            Ok(reply) => TreeSummary::parse(&reply),
            Err(e) => {
                tracing::warn!(error = %e, "tree summary failed, continuing without metadata");
                TreeSummary::Raw(String::new())
            }
        };
        if !summary.is_structured() {
            tracing::warn!("tree summary is not valid JSON, saving raw content");
        }

        self.artifacts
            .write_tree_summary(&summary)
            .map_err(FetchError::Artifact)?;
        Ok(summary)
    }

    /// Fetch every admitted blob and persist the raw files artifact.
    pub async fn fetch_files(
        &self,
        locator: &RepoLocator,
        tree: &[TreeEntry],
    ) -> Result<Vec<FetchedFile>, FetchError> {
        let paths: Vec<String> = tree
            .iter()
            .filter(|e| e.is_blob() && self.filter.admits(&e.path))
            .map(|e| e.path.clone())
            .collect();
        let total = paths.len() as u64;

        let gh = &self.config.github;
        let backoff = Backoff::new(gh.max_attempts, Duration::from_millis(gh.backoff_base_ms));
        let semaphore = Arc::new(Semaphore::new(gh.concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for path in paths {
            let source = Arc::clone(&self.source);
            let semaphore = Arc::clone(&semaphore);
            let locator = locator.clone();
            tasks.spawn(async move {
                // The semaphore is never closed, so acquire cannot fail.
                let _permit = semaphore.acquire_owned().await.ok();
                let result = retry_with_backoff(backoff, &path, |_| true, || {
                    source.fetch_file(&locator, &path)
                })
                .await;
                (path, result)
            });
        }

        let mut files = Vec::new();
        let mut done = 0u64;
        while let Some(joined) = tasks.join_next().await {
            done += 1;
            self.progress.report(FetchProgressEvent::Fetching {
                repo: locator.to_string(),
                n: done,
                total,
            });
            match joined {
                Ok((path, Ok(content))) if !content.is_empty() => {
                    files.push(FetchedFile { path, content })
                }
                Ok((path, Ok(_))) => tracing::debug!(%path, "skipping empty file"),
                Ok((path, Err(e))) => {
                    tracing::warn!(%path, error = %e, "dropping file after retries")
                }
                Err(e) => tracing::warn!(error = %e, "file fetch task failed"),
            }
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));
        tracing::info!(repo = %locator, fetched = files.len(), total, "fetched files with content");

        self.artifacts
            .write_files(&files)
            .map_err(FetchError::Artifact)?;
        Ok(files)
    }
}

/// `gitsurfer fetch`: fetch one repository into the artifact directory.
pub async fn run_fetch(config: Config, locator: &str) -> Result<()> {
    let locator = crate::locator::parse_locator(locator)?;
    let providers = crate::provider::Providers::from_config(&config)?;
    let chat = providers.chat(config.llm.provider)?;
    let source = Arc::new(crate::github::GitHubClient::new(&config.github)?);
    let artifacts = ArtifactStore::new(&config.paths.artifacts_dir);
    let config = Arc::new(config);

    let fetcher = FetchOrchestrator::new(config, source, chat, artifacts.clone())?
        .with_progress(crate::progress::ProgressMode::default_for_tty().reporter());
    let state = fetcher.run(&locator).await?;

    let files = state.files.map(|f| f.len()).unwrap_or(0);
    println!(
        "Fetched {} ({} tree entries, {} files) into {}",
        locator,
        state.tree.len(),
        files,
        artifacts.dir().display()
    );
    Ok(())
}

/// `- path` per line, cut at `max_chars` characters with a marker appended.
pub fn tree_text(tree: &[TreeEntry], max_chars: usize) -> String {
    let text = tree
        .iter()
        .map(|e| format!("- {}", e.path))
        .collect::<Vec<_>>()
        .join("\n");
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{}", &text[..cut], TRUNCATION_MARKER),
        None => text,
    }
}
