//! Persisted vector index.
//!
//! A [`VectorStore`] keeps embedded segments grouped in namespaces (one per
//! embedding provider), so indexes built with different providers never
//! mix. Segment ids are content-addressed (see [`crate::chunk::segment_id`]):
//! re-indexing the same content overwrites rather than duplicates.
//!
//! [`SqliteVectorStore`] persists each namespace in its own database file:
//!
//! ```text
//! <store_dir>/
//! ├── vector_store_gemini/index.sqlite
//! ├── vector_store_openai/index.sqlite
//! └── vector_store_cohere/index.sqlite
//! ```
//!
//! Similarity is brute-force cosine over every stored vector, computed in
//! Rust. [`InMemoryVectorStore`] offers the same behaviour without disk.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::{Row, SqlitePool};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tokio::sync::Mutex;

use crate::chunk::segment_id;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::models::Document;
use crate::{db, migrate};

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Drop every segment in `namespace`.
    async fn reset(&self, namespace: &str) -> Result<()>;

    /// Insert or replace segments. `embeddings[i]` belongs to `docs[i]`.
    async fn upsert(&self, namespace: &str, docs: &[Document], embeddings: &[Vec<f32>])
        -> Result<()>;

    /// Atomically swap the whole contents of `namespace` for these segments.
    /// On error the previous contents are left untouched.
    async fn replace(&self, namespace: &str, docs: &[Document], embeddings: &[Vec<f32>])
        -> Result<()>;

    /// The `k` nearest segments to `query`, most similar first.
    async fn search(&self, namespace: &str, query: &[f32], k: usize)
        -> Result<Vec<(Document, f32)>>;

    async fn count(&self, namespace: &str) -> Result<usize>;
}

fn check_lengths(docs: &[Document], embeddings: &[Vec<f32>]) -> Result<()> {
    if docs.len() != embeddings.len() {
        bail!(
            "{} documents but {} embeddings",
            docs.len(),
            embeddings.len()
        );
    }
    Ok(())
}

fn id_of(doc: &Document) -> String {
    segment_id(doc.source(), chunk_index(doc), &doc.content)
}

fn chunk_index(doc: &Document) -> usize {
    doc.metadata
        .get("chunk_index")
        .and_then(Value::as_u64)
        .unwrap_or(0) as usize
}

fn rank(mut scored: Vec<(Document, f32)>, k: usize) -> Vec<(Document, f32)> {
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    scored.truncate(k);
    scored
}

// ============ SQLite ============

pub struct SqliteVectorStore {
    root: PathBuf,
    pools: Mutex<HashMap<String, SqlitePool>>,
}

impl SqliteVectorStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            pools: Mutex::new(HashMap::new()),
        }
    }

    pub fn db_path(&self, namespace: &str) -> PathBuf {
        namespace_path(&self.root, namespace)
    }

    async fn pool(&self, namespace: &str) -> Result<SqlitePool> {
        let mut pools = self.pools.lock().await;
        if let Some(pool) = pools.get(namespace) {
            return Ok(pool.clone());
        }
        let pool = db::connect(&self.db_path(namespace)).await?;
        migrate::run_migrations(&pool).await?;
        pools.insert(namespace.to_string(), pool.clone());
        Ok(pool)
    }
}

/// `<root>/vector_store_<namespace>/index.sqlite`
pub fn namespace_path(root: &Path, namespace: &str) -> PathBuf {
    root.join(format!("vector_store_{}", namespace.to_lowercase()))
        .join("index.sqlite")
}

impl SqliteVectorStore {
    /// Write segments in one transaction, first clearing the namespace when
    /// `replace` is set. Readers see the old rows or the new ones, never a mix.
    async fn write(
        &self,
        namespace: &str,
        docs: &[Document],
        embeddings: &[Vec<f32>],
        replace: bool,
    ) -> Result<()> {
        check_lengths(docs, embeddings)?;
        let pool = self.pool(namespace).await?;
        let now = chrono::Utc::now().timestamp();
        let mut tx = pool.begin().await?;

        if replace {
            sqlx::query("DELETE FROM segments").execute(&mut *tx).await?;
        }

        for (doc, vec) in docs.iter().zip(embeddings) {
            sqlx::query(
                r#"
                INSERT INTO segments (id, source, chunk_index, content, metadata_json, embedding, dims, indexed_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    metadata_json = excluded.metadata_json,
                    embedding = excluded.embedding,
                    dims = excluded.dims,
                    indexed_at = excluded.indexed_at
                "#,
            )
            .bind(id_of(doc))
            .bind(doc.source())
            .bind(chunk_index(doc) as i64)
            .bind(&doc.content)
            .bind(serde_json::to_string(&doc.metadata)?)
            .bind(vec_to_blob(vec))
            .bind(vec.len() as i64)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn reset(&self, namespace: &str) -> Result<()> {
        let pool = self.pool(namespace).await?;
        sqlx::query("DELETE FROM segments").execute(&pool).await?;
        Ok(())
    }

    async fn upsert(
        &self,
        namespace: &str,
        docs: &[Document],
        embeddings: &[Vec<f32>],
    ) -> Result<()> {
        self.write(namespace, docs, embeddings, false).await
    }

    async fn replace(
        &self,
        namespace: &str,
        docs: &[Document],
        embeddings: &[Vec<f32>],
    ) -> Result<()> {
        self.write(namespace, docs, embeddings, true).await
    }

    async fn search(
        &self,
        namespace: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<(Document, f32)>> {
        let pool = self.pool(namespace).await?;
        let rows = sqlx::query("SELECT content, metadata_json, embedding FROM segments")
            .fetch_all(&pool)
            .await?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in rows {
            let blob: Vec<u8> = row.get("embedding");
            let meta: String = row.get("metadata_json");
            let metadata: Map<String, Value> =
                serde_json::from_str(&meta).context("corrupt segment metadata")?;
            let score = cosine_similarity(query, &blob_to_vec(&blob));
            scored.push((Document::new(row.get::<String, _>("content"), metadata), score));
        }
        Ok(rank(scored, k))
    }

    async fn count(&self, namespace: &str) -> Result<usize> {
        let pool = self.pool(namespace).await?;
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM segments")
            .fetch_one(&pool)
            .await?;
        Ok(n as usize)
    }
}

// ============ In-memory ============

type StoredSegment = (String, Document, Vec<f32>);

fn merge_rows(rows: &mut Vec<StoredSegment>, docs: &[Document], embeddings: &[Vec<f32>]) {
    for (doc, vec) in docs.iter().zip(embeddings) {
        let id = id_of(doc);
        match rows.iter_mut().find(|(rid, _, _)| *rid == id) {
            Some(row) => *row = (id, doc.clone(), vec.clone()),
            None => rows.push((id, doc.clone(), vec.clone())),
        }
    }
}

#[derive(Default)]
pub struct InMemoryVectorStore {
    namespaces: RwLock<HashMap<String, Vec<StoredSegment>>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn reset(&self, namespace: &str) -> Result<()> {
        self.namespaces
            .write()
            .map_err(|_| anyhow::anyhow!("vector store lock poisoned"))?
            .remove(namespace);
        Ok(())
    }

    async fn upsert(
        &self,
        namespace: &str,
        docs: &[Document],
        embeddings: &[Vec<f32>],
    ) -> Result<()> {
        check_lengths(docs, embeddings)?;
        let mut map = self
            .namespaces
            .write()
            .map_err(|_| anyhow::anyhow!("vector store lock poisoned"))?;
        merge_rows(map.entry(namespace.to_string()).or_default(), docs, embeddings);
        Ok(())
    }

    async fn replace(
        &self,
        namespace: &str,
        docs: &[Document],
        embeddings: &[Vec<f32>],
    ) -> Result<()> {
        check_lengths(docs, embeddings)?;
        let mut rows = Vec::with_capacity(docs.len());
        merge_rows(&mut rows, docs, embeddings);
        self.namespaces
            .write()
            .map_err(|_| anyhow::anyhow!("vector store lock poisoned"))?
            .insert(namespace.to_string(), rows);
        Ok(())
    }

    async fn search(
        &self,
        namespace: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<(Document, f32)>> {
        let map = self
            .namespaces
            .read()
            .map_err(|_| anyhow::anyhow!("vector store lock poisoned"))?;
        let scored = map
            .get(namespace)
            .map(|rows| {
                rows.iter()
                    .map(|(_, doc, vec)| (doc.clone(), cosine_similarity(query, vec)))
                    .collect()
            })
            .unwrap_or_default();
        Ok(rank(scored, k))
    }

    async fn count(&self, namespace: &str) -> Result<usize> {
        let map = self
            .namespaces
            .read()
            .map_err(|_| anyhow::anyhow!("vector store lock poisoned"))?;
        Ok(map.get(namespace).map_or(0, Vec::len))
    }
}
