//! Index orchestrator.
//!
//! ```text
//! CheckArtifacts ──(both present)──▶ IngestAndIndex ──▶ End
//!        └────────(missing)─────────────────────────────▶ End
//! ```
//!
//! IngestAndIndex loads the fetched files, overlays the flattened tree
//! summary metadata, splits documents into overlapping segments, embeds them
//! in batches and replaces the provider's namespace in the vector store.
//! [`IndexOrchestrator::run`] never fails: every problem ends up in
//! [`IndexState::error`] with both readiness flags false.

use anyhow::Context;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::artifacts::ArtifactStore;
use crate::chunk::Splitter;
use crate::config::Config;
use crate::error::IndexError;
use crate::models::{Document, FetchedFile};
use crate::provider::{ProviderKind, Providers};
use crate::retriever::Retriever;
use crate::store::{SqliteVectorStore, VectorStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStep {
    CheckArtifacts,
    IngestAndIndex,
    End,
}

/// Result of one index run.
///
/// `retriever_ready` implies `index_built` implies `files_ready`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexState {
    pub files_ready: bool,
    pub index_built: bool,
    pub retriever_ready: bool,
    pub error: Option<String>,
    pub provider: Option<ProviderKind>,
    pub segments: usize,
    #[serde(skip)]
    pub retriever: Option<Retriever>,
}

pub struct IndexOrchestrator {
    config: Arc<Config>,
    providers: Providers,
    store: Arc<dyn VectorStore>,
    artifacts: ArtifactStore,
}

impl IndexOrchestrator {
    pub fn new(
        config: Arc<Config>,
        providers: Providers,
        store: Arc<dyn VectorStore>,
        artifacts: ArtifactStore,
    ) -> Self {
        Self {
            config,
            providers,
            store,
            artifacts,
        }
    }

    /// Build the index for `provider` from the current artifacts.
    pub async fn run(&self, provider: ProviderKind) -> IndexState {
        let mut state = IndexState {
            provider: Some(provider),
            ..Default::default()
        };
        let mut step = IndexStep::CheckArtifacts;

        while step != IndexStep::End {
            tracing::debug!(?step, %provider, "index step");
            step = match step {
                IndexStep::CheckArtifacts => match self.check_artifacts() {
                    Ok(()) => {
                        state.files_ready = true;
                        IndexStep::IngestAndIndex
                    }
                    Err(e) => {
                        tracing::error!(dir = %self.artifacts.dir().display(), "{}", e);
                        state.error = Some(e.to_string());
                        IndexStep::End
                    }
                },
                IndexStep::IngestAndIndex => {
                    match self.ingest_and_index(provider).await {
                        Ok((retriever, segments)) => {
                            state.index_built = true;
                            state.retriever_ready = true;
                            state.segments = segments;
                            state.retriever = Some(retriever);
                            state.error = None;
                        }
                        Err(e) => {
                            tracing::error!(%provider, error = %e, "indexing failed");
                            state.index_built = false;
                            state.retriever_ready = false;
                            state.retriever = None;
                            state.error = Some(e.to_string());
                        }
                    }
                    IndexStep::End
                }
                IndexStep::End => IndexStep::End,
            };
        }
        state
    }

    pub fn check_artifacts(&self) -> Result<(), IndexError> {
        if self.artifacts.is_complete() {
            Ok(())
        } else {
            Err(IndexError::MissingArtifacts)
        }
    }

    /// Load, split, embed and persist. Returns the retriever and the number
    /// of stored segments.
    pub async fn ingest_and_index(
        &self,
        provider: ProviderKind,
    ) -> Result<(Retriever, usize), IndexError> {
        let embedder = self.providers.embedder(provider).map_err(IndexError::Ingest)?;

        let files = self.artifacts.read_files().map_err(IndexError::Ingest)?;
        let tree_meta = match self.artifacts.read_tree_summary() {
            Ok(summary) => summary.flatten(),
            Err(e) => {
                tracing::warn!(error = %e, "tree summary unreadable, indexing without it");
                BTreeMap::new()
            }
        };

        let documents = prepare_documents(&files, &tree_meta);
        let splitter = Splitter::new(
            self.config.chunking.chunk_size,
            self.config.chunking.chunk_overlap,
        );
        let segments = split_documents(&documents, &splitter);
        tracing::info!(
            files = files.len(),
            segments = segments.len(),
            %provider,
            model = embedder.model_name(),
            "indexing"
        );

        let namespace = provider.as_str();
        // Nothing is written until every batch has embedded, so a failed
        // run leaves the previous index intact.
        let ingest = async {
            let mut vectors = Vec::with_capacity(segments.len());
            for batch in segments.chunks(self.config.embedding.batch_size.max(1)) {
                let texts: Vec<String> = batch.iter().map(|d| d.content.clone()).collect();
                let embedded = embedder
                    .embed(&texts)
                    .await
                    .with_context(|| format!("embedding with {} failed", provider))?;
                vectors.extend(embedded);
            }
            self.store.replace(namespace, &segments, &vectors).await
        };
        ingest.await.map_err(IndexError::Ingest)?;

        if segments.is_empty() {
            tracing::warn!(%provider, "index is empty; questions will have no context");
        }

        let retriever = Retriever::new(
            provider,
            self.config.retrieval.k,
            embedder,
            Arc::clone(&self.store),
        );
        Ok((retriever, segments.len()))
    }
}

/// `gitsurfer index`: index the current artifacts for one provider, or for
/// every embedding provider with a key when `all` is set.
pub async fn run_index(config: Config, provider: Option<ProviderKind>, all: bool) -> anyhow::Result<()> {
    let providers = Providers::from_config(&config)?;
    let targets: Vec<ProviderKind> = if all {
        ProviderKind::ALL
            .into_iter()
            .filter(|k| providers.has_embedder(*k))
            .collect()
    } else {
        vec![provider.unwrap_or(config.embedding.provider)]
    };
    if targets.is_empty() {
        anyhow::bail!("No embedding provider has an API key set");
    }

    let store: Arc<dyn VectorStore> = Arc::new(SqliteVectorStore::new(&config.paths.store_dir));
    let artifacts = ArtifactStore::new(&config.paths.artifacts_dir);
    let config = Arc::new(config);
    let indexer = IndexOrchestrator::new(config, providers, store, artifacts);

    let mut failures = 0;
    for kind in targets {
        let state = indexer.run(kind).await;
        match state.error {
            None => println!("{:<8} indexed {} segments", kind.as_str(), state.segments),
            Some(e) => {
                failures += 1;
                println!("{:<8} failed: {}", kind.as_str(), e);
            }
        }
    }
    if failures > 0 && !all {
        anyhow::bail!("indexing failed");
    }
    Ok(())
}

/// One document per fetched file with path-derived metadata, overlaid by
/// the tree summary's entry for that path.
pub fn prepare_documents(
    files: &[FetchedFile],
    tree_meta: &BTreeMap<String, Map<String, Value>>,
) -> Vec<Document> {
    files
        .iter()
        .map(|file| {
            let path = Path::new(&file.path);
            let mut meta = Map::new();
            meta.insert("source".into(), json!(file.path));
            meta.insert("file_path".into(), json!(file.path));
            meta.insert(
                "file_name".into(),
                json!(path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()),
            );
            meta.insert(
                "file_type".into(),
                json!(path
                    .extension()
                    .map(|e| e.to_string_lossy().to_lowercase())
                    .unwrap_or_default()),
            );
            meta.insert("size".into(), json!(file.content.chars().count()));

            if let Some(extra) = tree_meta.get(&file.path) {
                for (k, v) in extra {
                    // identity keys stay path-derived
                    if k != "source" && k != "file_path" {
                        meta.insert(k.clone(), v.clone());
                    }
                }
            }
            Document::new(file.content.clone(), meta)
        })
        .collect()
}

/// Split each document, tagging segments with `chunk_index`.
pub fn split_documents(documents: &[Document], splitter: &Splitter) -> Vec<Document> {
    documents
        .iter()
        .flat_map(|doc| {
            splitter.split(&doc.content).into_iter().map(move |seg| {
                let mut meta = doc.metadata.clone();
                meta.insert("chunk_index".into(), json!(seg.index));
                Document::new(seg.text, meta)
            })
        })
        .collect()
}
