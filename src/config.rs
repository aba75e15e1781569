//! TOML configuration.
//!
//! The configuration is read once at startup into a [`Config`] value and
//! handed to every orchestrator by reference. Nothing reads settings from
//! the environment after [`load_config`] returns.
//!
//! A missing config file is not an error: every section has defaults that
//! match a stock setup (Gemini for chat and embeddings, 10 concurrent file
//! fetches, 1000/200 character chunks).

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::provider::ProviderKind;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub summary: SummaryConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    /// Vendor API keys, read from the environment, never from the file.
    #[serde(skip)]
    pub api_keys: HashMap<ProviderKind, String>,
}

impl Config {
    pub fn api_key(&self, kind: ProviderKind) -> Option<&str> {
        self.api_keys.get(&kind).map(String::as_str)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GithubConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Read from `GITHUB_TOKEN`, never from the file.
    #[serde(skip)]
    pub token: Option<String>,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            token: None,
            concurrency: default_concurrency(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            timeout_secs: default_timeout_secs(),
            include_globs: Vec::new(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}
fn default_concurrency() -> usize {
    10
}
fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    1000
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: ProviderKind,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_llm_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub streaming: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            temperature: 0.0,
            timeout_secs: default_llm_timeout_secs(),
            max_retries: default_llm_max_retries(),
            streaming: false,
        }
    }
}

fn default_provider() -> ProviderKind {
    ProviderKind::Gemini
}
fn default_llm_timeout_secs() -> u64 {
    60
}
fn default_llm_max_retries() -> u32 {
    2
}

impl LlmConfig {
    /// Model for `kind`: the configured model when `kind` is the configured
    /// provider, otherwise the vendor default.
    pub fn model_for(&self, kind: ProviderKind) -> String {
        match &self.model {
            Some(m) if kind == self.provider => m.clone(),
            _ => default_chat_model(kind).to_string(),
        }
    }
}

pub fn default_chat_model(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::Gemini => "gemini-2.0-flash",
        ProviderKind::OpenAI => "gpt-4o",
        ProviderKind::Anthropic => "claude-3-sonnet-20240229",
        ProviderKind::Cohere => "command",
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: ProviderKind,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embed_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            batch_size: default_batch_size(),
            max_retries: default_embed_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_batch_size() -> usize {
    64
}
fn default_embed_max_retries() -> u32 {
    5
}

impl EmbeddingConfig {
    pub fn model_for(&self, kind: ProviderKind) -> String {
        match &self.model {
            Some(m) if kind == self.provider => m.clone(),
            _ => default_embedding_model(kind).to_string(),
        }
    }
}

pub fn default_embedding_model(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::Gemini => "models/text-embedding-004",
        ProviderKind::OpenAI => "text-embedding-3-small",
        ProviderKind::Cohere => "embed-english-v3.0",
        ProviderKind::Anthropic => "",
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default = "default_queries_per_question")]
    pub queries_per_question: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            queries_per_question: default_queries_per_question(),
        }
    }
}

fn default_k() -> usize {
    5
}
fn default_queries_per_question() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct SummaryConfig {
    #[serde(default = "default_max_tree_chars")]
    pub max_tree_chars: usize,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            max_tree_chars: default_max_tree_chars(),
        }
    }
}

fn default_max_tree_chars() -> usize {
    3000
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: PathBuf,
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            artifacts_dir: default_artifacts_dir(),
            store_dir: default_store_dir(),
        }
    }
}

fn default_artifacts_dir() -> PathBuf {
    PathBuf::from("temp")
}
fn default_store_dir() -> PathBuf {
    PathBuf::from("DATA")
}

/// Load the config file (or defaults when it does not exist), apply
/// environment overrides, and validate.
pub fn load_config(path: &Path) -> Result<Config> {
    let _ = dotenvy::dotenv();

    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        parse_config(&content)?
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Config::default()
    };

    apply_env(&mut config, |var| std::env::var(var).ok())?;
    validate(&config)?;
    Ok(config)
}

/// Parse config text without touching the environment.
pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}

/// Apply environment overrides. `lookup` is injected so tests do not have to
/// mutate the process environment.
pub fn apply_env(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
    let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

    if let Some(p) = get("LLM_PROVIDER") {
        config.llm.provider = p.parse()?;
    }
    if let Some(p) = get("EMBEDDING_PROVIDER") {
        config.embedding.provider = p.parse()?;
    }

    let llm_var = match config.llm.provider {
        ProviderKind::Gemini => "GEMINI_LLM_MODEL",
        ProviderKind::OpenAI => "OPENAI_LLM_MODEL",
        ProviderKind::Anthropic => "ANTHROPIC_LLM_MODEL",
        ProviderKind::Cohere => "COHERE_LLM_MODEL",
    };
    if let Some(m) = get(llm_var) {
        config.llm.model = Some(m);
    }

    let embed_var = match config.embedding.provider {
        ProviderKind::Gemini => Some("GEMINI_EMBEDDING_MODEL"),
        ProviderKind::OpenAI => Some("OPENAI_EMBEDDING_MODEL"),
        ProviderKind::Cohere => Some("COHERE_EMBEDDING_MODEL"),
        ProviderKind::Anthropic => None,
    };
    if let Some(m) = embed_var.and_then(get) {
        config.embedding.model = Some(m);
    }

    if let Some(dir) = get("TEMP_DIR") {
        config.paths.artifacts_dir = PathBuf::from(dir);
    }
    if let Some(dir) = get("STORE_DIR") {
        config.paths.store_dir = PathBuf::from(dir);
    }
    config.github.token = get("GITHUB_TOKEN");

    config.api_keys.clear();
    for kind in ProviderKind::ALL {
        if let Some(key) = kind.api_key_vars().iter().find_map(|var| get(*var)) {
            config.api_keys.insert(kind, key);
        }
    }

    Ok(())
}

pub fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        bail!("chunking.chunk_overlap must be < chunking.chunk_size");
    }
    if config.github.concurrency == 0 {
        bail!("github.concurrency must be >= 1");
    }
    if config.github.max_attempts == 0 {
        bail!("github.max_attempts must be >= 1");
    }
    if config.retrieval.k == 0 {
        bail!("retrieval.k must be >= 1");
    }
    if config.retrieval.queries_per_question == 0 {
        bail!("retrieval.queries_per_question must be >= 1");
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be >= 1");
    }
    if !config.embedding.provider.supports_embeddings() {
        bail!(
            "embedding.provider '{}' does not offer embeddings. Use gemini, openai, or cohere.",
            config.embedding.provider
        );
    }
    Ok(())
}
