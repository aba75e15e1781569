//! Research orchestrator: one question, one pass.
//!
//! generate queries ──▶ retrieve (all queries concurrently) ──▶ merge
//!
//! The model rephrases the question into a few differently worded search
//! queries; each is run against the retriever and the hits are merged,
//! deduplicated on `(content, source)`. Failures never escape: a failed
//! query generation falls back to the question itself, and a failed
//! retrieval yields no documents for this question.

use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::config::Config;
use crate::llm::{complete_as, ChatModel, CompletionOptions};
use crate::models::{merge_documents, Document, Message};
use crate::prompts;
use crate::provider::{ProviderKind, Providers};
use crate::retriever::Retriever;
use crate::store::{SqliteVectorStore, VectorStore};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResearchState {
    pub question: String,
    pub queries: Vec<String>,
    pub documents: Vec<Document>,
}

#[derive(Deserialize)]
struct Queries {
    queries: Vec<String>,
}

fn queries_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "queries": { "type": "array", "items": { "type": "string" } }
        },
        "required": ["queries"]
    })
}

pub struct ResearchOrchestrator {
    config: Arc<Config>,
    chat: Arc<dyn ChatModel>,
    options: CompletionOptions,
}

impl ResearchOrchestrator {
    pub fn new(config: Arc<Config>, chat: Arc<dyn ChatModel>) -> Self {
        Self {
            config,
            chat,
            options: CompletionOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CompletionOptions) -> Self {
        self.options = options;
        self
    }

    pub async fn run(&self, question: &str, retriever: &Retriever) -> ResearchState {
        let queries = self.generate_queries(question).await;
        let documents = match retrieve_all(retriever, &queries).await {
            Ok(docs) => docs,
            Err(e) => {
                tracing::warn!(%question, error = %e, "research retrieval failed");
                Vec::new()
            }
        };
        tracing::info!(%question, queries = queries.len(), documents = documents.len(), "research done");
        ResearchState {
            question: question.to_string(),
            queries,
            documents,
        }
    }

    /// Up to `retrieval.queries_per_question` distinct queries; the question
    /// itself when the model gives none.
    pub async fn generate_queries(&self, question: &str) -> Vec<String> {
        let n = self.config.retrieval.queries_per_question;
        let messages = [
            Message::system(prompts::queries_prompt(n)),
            Message::user(question),
        ];
        let generated: Vec<String> =
            match complete_as::<Queries>(self.chat.as_ref(), &messages, &queries_schema(), &self.options)
                .await
            {
                Ok(q) => q.queries,
                Err(e) => {
                    tracing::warn!(error = %e, "query generation failed, searching the question directly");
                    Vec::new()
                }
            };

        let mut queries: Vec<String> = Vec::new();
        for q in generated {
            let q = q.trim();
            if !q.is_empty() && !queries.iter().any(|seen| seen == q) {
                queries.push(q.to_string());
            }
        }
        queries.truncate(n);
        if queries.is_empty() {
            queries.push(question.to_string());
        }
        queries
    }
}

/// `gitsurfer search`: research one question against the persisted index
/// and print the sources found.
pub async fn run_search(
    config: Config,
    question: &str,
    provider: Option<ProviderKind>,
) -> anyhow::Result<()> {
    let providers = Providers::from_config(&config)?;
    let kind = provider.unwrap_or(config.embedding.provider);
    let store: Arc<dyn VectorStore> = Arc::new(SqliteVectorStore::new(&config.paths.store_dir));
    if store.count(kind.as_str()).await? == 0 {
        anyhow::bail!("No index for '{}'. Run `gitsurfer index` first.", kind);
    }
    let retriever = Retriever::new(kind, config.retrieval.k, providers.embedder(kind)?, store);
    let chat = providers.chat(config.llm.provider)?;

    let research = ResearchOrchestrator::new(Arc::new(config), chat);
    let state = research.run(question, &retriever).await;

    println!("Queries:");
    for q in &state.queries {
        println!("  - {}", q);
    }
    if state.documents.is_empty() {
        println!("No results.");
        return Ok(());
    }
    println!("\nResults:");
    for (i, doc) in state.documents.iter().enumerate() {
        let chunk = doc
            .metadata
            .get("chunk_index")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        println!("{:>3}. {} (chunk {})", i + 1, doc.source(), chunk);
        let preview: String = doc.content.chars().take(160).collect();
        println!("     {}", preview.replace('\n', " "));
    }
    Ok(())
}

/// Run every query concurrently on this task and merge the hits.
async fn retrieve_all(retriever: &Retriever, queries: &[String]) -> anyhow::Result<Vec<Document>> {
    let results = futures::future::join_all(queries.iter().map(|q| retriever.retrieve(q))).await;
    let mut documents = Vec::new();
    for result in results {
        merge_documents(&mut documents, result?);
    }
    Ok(documents)
}
