//! Index orchestrator over written artifacts, with both vector stores.

mod common;

use std::sync::Arc;
use tempfile::TempDir;

use common::{letter_vector, providers, test_config, FakeEmbedder, ScriptedChat};
use gitsurfer::artifacts::{ArtifactStore, TreeSummary};
use gitsurfer::config::Config;
use gitsurfer::index::IndexOrchestrator;
use gitsurfer::models::FetchedFile;
use gitsurfer::provider::ProviderKind;
use gitsurfer::store::{namespace_path, InMemoryVectorStore, SqliteVectorStore, VectorStore};

fn write_artifacts(artifacts: &ArtifactStore, files: &[(&str, &str)], summary: &str) {
    let files: Vec<FetchedFile> = files
        .iter()
        .map(|(path, content)| FetchedFile {
            path: path.to_string(),
            content: content.to_string(),
        })
        .collect();
    artifacts.write_files(&files).unwrap();
    artifacts
        .write_tree_summary(&TreeSummary::parse(summary))
        .unwrap();
}

fn indexer(config: &Config, store: Arc<dyn VectorStore>) -> IndexOrchestrator {
    indexer_with(config, store, FakeEmbedder::default())
}

fn indexer_with(
    config: &Config,
    store: Arc<dyn VectorStore>,
    embedder: FakeEmbedder,
) -> IndexOrchestrator {
    IndexOrchestrator::new(
        Arc::new(config.clone()),
        providers(Arc::new(ScriptedChat::new()), Arc::new(embedder)),
        store,
        ArtifactStore::new(&config.paths.artifacts_dir),
    )
}

#[tokio::test]
async fn test_missing_artifacts() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let state = indexer(&config, Arc::new(InMemoryVectorStore::new()))
        .run(ProviderKind::Gemini)
        .await;

    assert!(!state.files_ready);
    assert!(!state.index_built);
    assert!(!state.retriever_ready);
    assert!(state.retriever.is_none());
    assert_eq!(state.error.as_deref(), Some("Required files not found"));
}

#[tokio::test]
async fn test_builds_retriever_with_metadata() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    write_artifacts(
        &ArtifactStore::new(&config.paths.artifacts_dir),
        &[
            ("README.md", "Hello"),
            ("src/main.rs", "fn main() { println!(\"zzz\"); }"),
        ],
        r#"{"README.md": {"type": "file", "size": 5, "language": "markdown"}}"#,
    );

    let store = Arc::new(InMemoryVectorStore::new());
    let state = indexer(&config, store.clone()).run(ProviderKind::Gemini).await;

    assert!(state.files_ready && state.index_built && state.retriever_ready);
    assert!(state.error.is_none());
    assert_eq!(state.segments, 2);
    assert_eq!(store.count("gemini").await.unwrap(), 2);

    let retriever = state.retriever.unwrap();
    let docs = retriever.retrieve("hello").await.unwrap();
    let readme = docs.iter().find(|d| d.source() == "README.md").unwrap();
    assert_eq!(readme.metadata["language"], "markdown");
    assert_eq!(readme.metadata["file_type"], "md");
    assert_eq!(readme.metadata["chunk_index"], 0);
}

#[tokio::test]
async fn test_raw_summary_still_indexes() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    write_artifacts(
        &ArtifactStore::new(&config.paths.artifacts_dir),
        &[("README.md", "Hello")],
        "not json at all",
    );
    let state = indexer(&config, Arc::new(InMemoryVectorStore::new()))
        .run(ProviderKind::Gemini)
        .await;
    assert!(state.retriever_ready);
    assert_eq!(state.segments, 1);
}

#[tokio::test]
async fn test_unregistered_embedder_fails_index() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    write_artifacts(
        &ArtifactStore::new(&config.paths.artifacts_dir),
        &[("README.md", "Hello")],
        "{}",
    );
    let state = indexer(&config, Arc::new(InMemoryVectorStore::new()))
        .run(ProviderKind::Cohere)
        .await;

    assert!(state.files_ready);
    assert!(!state.index_built);
    assert!(!state.retriever_ready);
    assert!(state.error.unwrap().contains("COHERE_API_KEY"));
}

#[tokio::test]
async fn test_reindex_replaces_previous_repository() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let artifacts = ArtifactStore::new(&config.paths.artifacts_dir);
    let store = Arc::new(InMemoryVectorStore::new());

    write_artifacts(&artifacts, &[("a.txt", "first repo"), ("b.txt", "more")], "{}");
    indexer(&config, store.clone()).run(ProviderKind::Gemini).await;
    assert_eq!(store.count("gemini").await.unwrap(), 2);

    write_artifacts(&artifacts, &[("c.txt", "second repo")], "{}");
    indexer(&config, store.clone()).run(ProviderKind::Gemini).await;
    assert_eq!(store.count("gemini").await.unwrap(), 1);
}

#[tokio::test]
async fn test_sqlite_store_persists_per_provider() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    write_artifacts(
        &ArtifactStore::new(&config.paths.artifacts_dir),
        &[("README.md", "Hello"), ("LICENSE", "MIT License")],
        "{}",
    );

    let store = Arc::new(SqliteVectorStore::new(&config.paths.store_dir));
    let state = indexer(&config, store.clone()).run(ProviderKind::Gemini).await;
    assert!(state.retriever_ready, "{:?}", state.error);

    let db = namespace_path(&config.paths.store_dir, "gemini");
    assert!(db.exists(), "{}", db.display());
    assert_eq!(store.count("gemini").await.unwrap(), 2);
    assert_eq!(store.count("openai").await.unwrap(), 0);

    // a fresh handle sees the persisted segments
    let reopened = SqliteVectorStore::new(&config.paths.store_dir);
    assert_eq!(reopened.count("gemini").await.unwrap(), 2);
}

#[tokio::test]
async fn test_failed_reindex_keeps_previous_index() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.embedding.batch_size = 1;
    let artifacts = ArtifactStore::new(&config.paths.artifacts_dir);
    let store = Arc::new(SqliteVectorStore::new(&config.paths.store_dir));

    write_artifacts(
        &artifacts,
        &[("a.txt", "alpha"), ("b.txt", "beta"), ("c.txt", "gamma")],
        "{}",
    );
    let state = indexer(&config, store.clone()).run(ProviderKind::Gemini).await;
    assert!(state.retriever_ready, "{:?}", state.error);
    assert_eq!(store.count("gemini").await.unwrap(), 3);

    // second batch of the new repository fails to embed
    write_artifacts(
        &artifacts,
        &[("d.txt", "delta"), ("e.txt", "epsilon"), ("f.txt", "zeta")],
        "{}",
    );
    let state = indexer_with(&config, store.clone(), FakeEmbedder::failing_from(2))
        .run(ProviderKind::Gemini)
        .await;

    assert!(!state.index_built);
    assert!(!state.retriever_ready);
    let error = state.error.unwrap();
    assert!(error.contains("embedding with gemini failed"), "{error}");
    assert!(error.contains("embedding service unavailable"), "{error}");

    assert_eq!(store.count("gemini").await.unwrap(), 3);
    let mut sources: Vec<String> = store
        .search("gemini", &letter_vector("alpha"), 10)
        .await
        .unwrap()
        .into_iter()
        .map(|(doc, _)| doc.source().to_string())
        .collect();
    sources.sort();
    assert_eq!(sources, vec!["a.txt", "b.txt", "c.txt"]);
}

#[tokio::test]
async fn test_failed_first_index_leaves_store_empty() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.embedding.batch_size = 1;
    write_artifacts(
        &ArtifactStore::new(&config.paths.artifacts_dir),
        &[("a.txt", "alpha"), ("b.txt", "beta")],
        "{}",
    );
    let store = Arc::new(InMemoryVectorStore::new());
    let state = indexer_with(&config, store.clone(), FakeEmbedder::failing_from(2))
        .run(ProviderKind::Gemini)
        .await;

    assert!(!state.retriever_ready);
    assert_eq!(store.count("gemini").await.unwrap(), 0);
}
