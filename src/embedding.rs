//! Embedding capability and vector utilities.
//!
//! [`Embedder`] turns a batch of texts into vectors. [`HttpEmbedder`]
//! implements it for the vendors that offer embeddings:
//!
//! | Vendor | Endpoint | Default model |
//! |--------|----------|---------------|
//! | Gemini | `POST /v1beta/{model}:batchEmbedContents` | `models/text-embedding-004` |
//! | OpenAI | `POST /v1/embeddings` | `text-embedding-3-small` |
//! | Cohere | `POST /v2/embed` | `embed-english-v3.0` |
//!
//! Vectors are stored in SQLite as little-endian `f32` blobs
//! ([`vec_to_blob`] / [`blob_to_vec`]) and ranked with [`cosine_similarity`].

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::http::{self, send_json};
use crate::provider::ProviderKind;

#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_name(&self) -> &str;

    /// One vector per input text, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a search query. Vendors that distinguish queries from stored
    /// documents override this; the default embeds it like a document.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        first_vector(self.embed(&[text.to_string()]).await?)
    }
}

fn first_vector(vectors: Vec<Vec<f32>>) -> Result<Vec<f32>> {
    vectors
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("Empty embedding response"))
}

/// Which side of a search the texts are on. Only Cohere's v3 models care.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputType {
    Document,
    Query,
}

impl InputType {
    fn as_cohere(self) -> &'static str {
        match self {
            InputType::Document => "search_document",
            InputType::Query => "search_query",
        }
    }
}

pub struct HttpEmbedder {
    kind: ProviderKind,
    model: String,
    api_key: String,
    base_url: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl HttpEmbedder {
    pub fn new(kind: ProviderKind, api_key: String, config: &EmbeddingConfig) -> Result<Self> {
        if !kind.supports_embeddings() {
            bail!("Provider '{}' does not offer embeddings", kind);
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            kind,
            model: config.model_for(kind),
            api_key,
            base_url: default_base_url(kind).to_string(),
            max_retries: config.max_retries,
            client,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn request(&self, texts: &[String], input_type: InputType) -> (String, Value) {
        match self.kind {
            ProviderKind::Gemini => {
                let model = if self.model.starts_with("models/") {
                    self.model.clone()
                } else {
                    format!("models/{}", self.model)
                };
                let requests: Vec<Value> = texts
                    .iter()
                    .map(|t| json!({ "model": model, "content": { "parts": [{ "text": t }] } }))
                    .collect();
                (
                    format!("{}/v1beta/{}:batchEmbedContents", self.base_url, model),
                    json!({ "requests": requests }),
                )
            }
            ProviderKind::Cohere => (
                format!("{}/v2/embed", self.base_url),
                json!({
                    "model": self.model,
                    "texts": texts,
                    "input_type": input_type.as_cohere(),
                    "embedding_types": ["float"],
                }),
            ),
            // OpenAI; Anthropic is rejected in `new`.
            _ => (
                format!("{}/v1/embeddings", self.base_url),
                json!({ "model": self.model, "input": texts }),
            ),
        }
    }
}

impl HttpEmbedder {
    async fn embed_as(&self, texts: &[String], input_type: InputType) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let (url, body) = self.request(texts, input_type);
        let reply = send_json(self.kind.as_str(), http::vendor_backoff(self.max_retries), || {
            let req = self.client.post(&url).json(&body);
            match self.kind {
                ProviderKind::Gemini => req.header("x-goog-api-key", &self.api_key),
                _ => req.bearer_auth(&self.api_key),
            }
        })
        .await?;
        let vectors = parse_vectors(self.kind, &reply)?;
        if vectors.len() != texts.len() {
            bail!(
                "{} returned {} embeddings for {} texts",
                self.kind,
                vectors.len(),
                texts.len()
            );
        }
        Ok(vectors)
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embed_as(texts, InputType::Document).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        first_vector(self.embed_as(&[text.to_string()], InputType::Query).await?)
    }
}

fn default_base_url(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::Gemini => "https://generativelanguage.googleapis.com",
        ProviderKind::Cohere => "https://api.cohere.com",
        _ => "https://api.openai.com",
    }
}

/// Pull the vectors out of a vendor response.
fn parse_vectors(kind: ProviderKind, reply: &Value) -> Result<Vec<Vec<f32>>> {
    let rows: Vec<&Value> = match kind {
        ProviderKind::Gemini => reply["embeddings"]
            .as_array()
            .ok_or_else(|| anyhow!("Invalid gemini response: missing embeddings array"))?
            .iter()
            .map(|e| &e["values"])
            .collect(),
        ProviderKind::Cohere => reply
            .pointer("/embeddings/float")
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow!("Invalid cohere response: missing embeddings.float"))?
            .iter()
            .collect(),
        _ => {
            let mut data: Vec<&Value> = reply["data"]
                .as_array()
                .ok_or_else(|| anyhow!("Invalid OpenAI response: missing data array"))?
                .iter()
                .collect();
            // The API may reorder; `index` is authoritative.
            data.sort_by_key(|d| d["index"].as_u64().unwrap_or(0));
            data.into_iter().map(|d| &d["embedding"]).collect()
        }
    };

    rows.into_iter()
        .map(|row| {
            row.as_array()
                .ok_or_else(|| anyhow!("Invalid {} response: embedding is not an array", kind))
                .map(|vals| {
                    vals.iter()
                        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                        .collect()
                })
        })
        .collect()
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// ```rust
/// use gitsurfer::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` for empty, mismatched or zero
/// vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (dot, na, nb) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(d, x2, y2), (x, y)| {
            (d + x * y, x2 + x * x, y2 + y * y)
        });
    let denom = na.sqrt() * nb.sqrt();
    if denom < f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}
