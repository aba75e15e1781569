//! Provider selection.
//!
//! Providers are a closed set ([`ProviderKind`]). Capability implementations
//! are looked up through a [`Providers`] registry that is built once at
//! startup, so orchestrators never match on provider strings per call.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │               Providers                  │
//! │  chat:  Gemini · OpenAI · Anthropic ·    │
//! │         Cohere                           │
//! │  embed: Gemini · OpenAI · Cohere         │
//! └──────────────┬───────────────────────────┘
//!                ▼
//!   Fetch · Index · Research · Conversation
//! ```

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::Config;
use crate::embedding::{self, Embedder};
use crate::llm::{self, ChatModel};

/// A model vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Gemini,
    #[serde(rename = "openai")]
    OpenAI,
    Anthropic,
    Cohere,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::Gemini,
        ProviderKind::OpenAI,
        ProviderKind::Anthropic,
        ProviderKind::Cohere,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini",
            ProviderKind::OpenAI => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Cohere => "cohere",
        }
    }

    /// Whether the vendor offers an embeddings endpoint.
    pub fn supports_embeddings(self) -> bool {
        !matches!(self, ProviderKind::Anthropic)
    }

    /// Environment variables checked, in order, for this vendor's API key.
    pub fn api_key_vars(self) -> &'static [&'static str] {
        match self {
            ProviderKind::Gemini => &["GOOGLE_API_KEY", "GEMINI_API_KEY"],
            ProviderKind::OpenAI => &["OPENAI_API_KEY"],
            ProviderKind::Anthropic => &["ANTHROPIC_API_KEY"],
            ProviderKind::Cohere => &["COHERE_API_KEY"],
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            "openai" => Ok(ProviderKind::OpenAI),
            "anthropic" | "claude" => Ok(ProviderKind::Anthropic),
            "cohere" => Ok(ProviderKind::Cohere),
            other => bail!(
                "Unknown provider: '{}'. Must be gemini, openai, anthropic, or cohere.",
                other
            ),
        }
    }
}

/// Registry of capability implementations keyed by provider.
#[derive(Clone, Default)]
pub struct Providers {
    chat: HashMap<ProviderKind, Arc<dyn ChatModel>>,
    embedders: HashMap<ProviderKind, Arc<dyn Embedder>>,
}

impl Providers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the HTTP implementation of every provider with an API key in
    /// `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut providers = Self::new();
        for kind in ProviderKind::ALL {
            let Some(key) = config.api_key(kind).map(str::to_string) else {
                tracing::debug!(provider = %kind, "no API key, provider not registered");
                continue;
            };
            providers.register_chat(
                kind,
                Arc::new(llm::HttpChatModel::new(kind, key.clone(), &config.llm)?),
            );
            if kind.supports_embeddings() {
                providers.register_embedder(
                    kind,
                    Arc::new(embedding::HttpEmbedder::new(kind, key, &config.embedding)?),
                );
            }
        }
        Ok(providers)
    }

    pub fn register_chat(&mut self, kind: ProviderKind, model: Arc<dyn ChatModel>) {
        self.chat.insert(kind, model);
    }

    pub fn register_embedder(&mut self, kind: ProviderKind, embedder: Arc<dyn Embedder>) {
        self.embedders.insert(kind, embedder);
    }

    pub fn chat(&self, kind: ProviderKind) -> Result<Arc<dyn ChatModel>> {
        self.chat
            .get(&kind)
            .cloned()
            .ok_or_else(|| missing(kind, "language model"))
    }

    pub fn embedder(&self, kind: ProviderKind) -> Result<Arc<dyn Embedder>> {
        if !kind.supports_embeddings() {
            bail!("Provider '{}' does not offer embeddings", kind);
        }
        self.embedders
            .get(&kind)
            .cloned()
            .ok_or_else(|| missing(kind, "embedding"))
    }

    pub fn has_chat(&self, kind: ProviderKind) -> bool {
        self.chat.contains_key(&kind)
    }

    pub fn has_embedder(&self, kind: ProviderKind) -> bool {
        self.embedders.contains_key(&kind)
    }
}

fn missing(kind: ProviderKind, capability: &str) -> anyhow::Error {
    anyhow::anyhow!(
        "No {} provider registered for '{}' (set {})",
        capability,
        kind,
        kind.api_key_vars().join(" or ")
    )
}

/// Print the provider table for `gitsurfer providers`.
pub fn list_providers(config: &Config, providers: &Providers) {
    println!(
        "{:<12} {:<6} {:<6} {:<8} DEFAULT",
        "PROVIDER", "CHAT", "EMBED", "API KEY"
    );
    for kind in ProviderKind::ALL {
        let default = match (
            kind == config.llm.provider,
            kind == config.embedding.provider,
        ) {
            (true, true) => "chat, embedding",
            (true, false) => "chat",
            (false, true) => "embedding",
            (false, false) => "",
        };
        println!(
            "{:<12} {:<6} {:<6} {:<8} {}",
            kind.as_str(),
            yes_no(providers.has_chat(kind)),
            yes_no(providers.has_embedder(kind)),
            yes_no(config.api_key(kind).is_some()),
            default
        );
    }
}

fn yes_no(b: bool) -> &'static str {
    if b {
        "yes"
    } else {
        "no"
    }
}
