//! Retriever handle.
//!
//! A [`Retriever`] is bound to one namespace of one [`VectorStore`] and the
//! embedder that built it. It is cheap to clone and read-only: every clone
//! shares the same inner handle, which [`Retriever::same_index`] checks.

use anyhow::Result;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::embedding::Embedder;
use crate::models::Document;
use crate::provider::ProviderKind;
use crate::store::VectorStore;

#[derive(Clone)]
pub struct Retriever {
    inner: Arc<Inner>,
}

struct Inner {
    id: Uuid,
    provider: ProviderKind,
    k: usize,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
}

impl Retriever {
    pub fn new(
        provider: ProviderKind,
        k: usize,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: Uuid::new_v4(),
                provider,
                k: k.max(1),
                embedder,
                store,
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn provider(&self) -> ProviderKind {
        self.inner.provider
    }

    pub fn k(&self) -> usize {
        self.inner.k
    }

    /// Whether both handles were produced by the same index build.
    pub fn same_index(&self, other: &Retriever) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// The `k` documents nearest to `query`.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<Document>> {
        let vector = self.inner.embedder.embed_query(query).await?;
        let hits = self
            .inner
            .store
            .search(self.inner.provider.as_str(), &vector, self.inner.k)
            .await?;
        tracing::debug!(%query, hits = hits.len(), "retrieved");
        Ok(hits.into_iter().map(|(doc, _)| doc).collect())
    }
}

impl fmt::Debug for Retriever {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retriever")
            .field("id", &self.inner.id)
            .field("provider", &self.inner.provider)
            .field("k", &self.inner.k)
            .finish()
    }
}
