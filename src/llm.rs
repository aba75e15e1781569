//! Language-model capability.
//!
//! [`ChatModel`] is the seam every orchestrator talks to. It offers a plain
//! completion and a structured completion that returns parsed JSON matching
//! a caller-supplied schema. [`HttpChatModel`] implements it against the four
//! supported vendors; tests substitute scripted fakes.
//!
//! | Vendor | Endpoint |
//! |--------|----------|
//! | Gemini | `POST /v1beta/models/{model}:generateContent` |
//! | OpenAI | `POST /v1/chat/completions` |
//! | Anthropic | `POST /v1/messages` |
//! | Cohere | `POST /v2/chat` |

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::http::{self, send_json};
use crate::models::{Message, Role};
use crate::provider::ProviderKind;

/// Hooks observing a completion. All methods default to no-ops.
pub trait CompletionCallback: Send + Sync {
    fn on_start(&self) {}
    fn on_text(&self, _text: &str) {}
    fn on_end(&self, _full: &str) {}
}

/// Per-call options. Opaque to the orchestrators, which only pass them on.
#[derive(Clone, Default)]
pub struct CompletionOptions {
    pub streaming: bool,
    pub callbacks: Vec<Arc<dyn CompletionCallback>>,
}

impl CompletionOptions {
    pub fn streaming(mut self, on: bool) -> Self {
        self.streaming = on;
        self
    }

    pub fn with_callback(mut self, cb: Arc<dyn CompletionCallback>) -> Self {
        self.callbacks.push(cb);
        self
    }

    /// Hand a finished completion to the callbacks: line by line when
    /// streaming, as one piece otherwise.
    pub fn deliver(&self, text: &str) {
        if self.callbacks.is_empty() {
            return;
        }
        for cb in &self.callbacks {
            cb.on_start();
        }
        if self.streaming {
            for line in text.split_inclusive('\n') {
                for cb in &self.callbacks {
                    cb.on_text(line);
                }
            }
        } else {
            for cb in &self.callbacks {
                cb.on_text(text);
            }
        }
        for cb in &self.callbacks {
            cb.on_end(text);
        }
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, messages: &[Message], opts: &CompletionOptions) -> Result<String>;

    /// Completion constrained to `schema`. The default implementation states
    /// the schema as an instruction and parses the reply.
    async fn complete_structured(
        &self,
        messages: &[Message],
        schema: &Value,
        opts: &CompletionOptions,
    ) -> Result<Value> {
        let mut msgs = messages.to_vec();
        msgs.push(Message::system(schema_instruction(schema)));
        let text = self.complete(&msgs, opts).await?;
        parse_json_reply(&text)
    }
}

/// Structured completion deserialised into `T`.
pub async fn complete_as<T: DeserializeOwned>(
    model: &dyn ChatModel,
    messages: &[Message],
    schema: &Value,
    opts: &CompletionOptions,
) -> Result<T> {
    let value = model.complete_structured(messages, schema, opts).await?;
    serde_json::from_value(value).context("structured reply does not match schema")
}

fn schema_instruction(schema: &Value) -> String {
    format!(
        "Respond with a single JSON value that conforms to this JSON schema, and nothing else:\n{}",
        schema
    )
}

/// Remove a surrounding markdown code fence (```` ```json ... ``` ````).
pub fn strip_code_fence(text: &str) -> &str {
    let t = text.trim();
    let Some(rest) = t.strip_prefix("```") else {
        return t;
    };
    let body = match rest.find('\n') {
        Some(nl) => &rest[nl + 1..],
        None => rest,
    };
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Parse a model reply as JSON, tolerating a code fence.
pub fn parse_json_reply(text: &str) -> Result<Value> {
    serde_json::from_str(strip_code_fence(text))
        .with_context(|| format!("reply is not valid JSON: {}", preview(text)))
}

fn preview(text: &str) -> String {
    let mut s: String = text.chars().take(120).collect();
    if text.chars().count() > 120 {
        s.push('…');
    }
    s
}

/// Chat model backed by a vendor's REST API.
pub struct HttpChatModel {
    kind: ProviderKind,
    model: String,
    api_key: String,
    base_url: String,
    temperature: f32,
    max_retries: u32,
    client: reqwest::Client,
}

impl HttpChatModel {
    pub fn new(kind: ProviderKind, api_key: String, config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            kind,
            model: config.model_for(kind),
            api_key,
            base_url: default_base_url(kind).to_string(),
            temperature: config.temperature,
            max_retries: config.max_retries,
            client,
        })
    }

    /// Point at a different host (proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn request(&self, messages: &[Message]) -> (String, Value) {
        let (system, turns) = split_system(messages);
        match self.kind {
            ProviderKind::Gemini => {
                let contents: Vec<Value> = turns
                    .iter()
                    .map(|m| {
                        let role = if m.role == Role::Assistant { "model" } else { "user" };
                        json!({ "role": role, "parts": [{ "text": m.content }] })
                    })
                    .collect();
                let mut body = json!({
                    "contents": contents,
                    "generationConfig": { "temperature": self.temperature },
                });
                if let Some(sys) = system {
                    body["systemInstruction"] = json!({ "parts": [{ "text": sys }] });
                }
                (
                    format!(
                        "{}/v1beta/models/{}:generateContent",
                        self.base_url, self.model
                    ),
                    body,
                )
            }
            ProviderKind::OpenAI | ProviderKind::Cohere => {
                let msgs: Vec<Value> = messages
                    .iter()
                    .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
                    .collect();
                let path = if self.kind == ProviderKind::OpenAI {
                    "v1/chat/completions"
                } else {
                    "v2/chat"
                };
                (
                    format!("{}/{}", self.base_url, path),
                    json!({
                        "model": self.model,
                        "messages": msgs,
                        "temperature": self.temperature,
                    }),
                )
            }
            ProviderKind::Anthropic => {
                let msgs: Vec<Value> = turns
                    .iter()
                    .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
                    .collect();
                let mut body = json!({
                    "model": self.model,
                    "max_tokens": 4096,
                    "messages": msgs,
                    "temperature": self.temperature,
                });
                if let Some(sys) = system {
                    body["system"] = json!(sys);
                }
                (format!("{}/v1/messages", self.base_url), body)
            }
        }
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.kind {
            ProviderKind::Gemini => req.header("x-goog-api-key", &self.api_key),
            ProviderKind::Anthropic => req
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", "2023-06-01"),
            ProviderKind::OpenAI | ProviderKind::Cohere => req.bearer_auth(&self.api_key),
        }
    }
}

#[async_trait]
impl ChatModel for HttpChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[Message], opts: &CompletionOptions) -> Result<String> {
        let (url, body) = self.request(messages);
        tracing::debug!(provider = %self.kind, model = %self.model, messages = messages.len(), "chat completion");
        let reply = send_json(self.kind.as_str(), http::vendor_backoff(self.max_retries), || {
            self.authorize(self.client.post(&url)).json(&body)
        })
        .await?;
        let text = extract_text(self.kind, &reply)?;
        opts.deliver(&text);
        Ok(text)
    }
}

fn default_base_url(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::Gemini => "https://generativelanguage.googleapis.com",
        ProviderKind::OpenAI => "https://api.openai.com",
        ProviderKind::Anthropic => "https://api.anthropic.com",
        ProviderKind::Cohere => "https://api.cohere.com",
    }
}

/// Join all system messages into one instruction; return the rest.
fn split_system(messages: &[Message]) -> (Option<String>, Vec<&Message>) {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();
    let turns = messages.iter().filter(|m| m.role != Role::System).collect();
    let system = (!system.is_empty()).then(|| system.join("\n\n"));
    (system, turns)
}

fn extract_text(kind: ProviderKind, reply: &Value) -> Result<String> {
    let parts: Option<Vec<&str>> = match kind {
        ProviderKind::Gemini => reply
            .pointer("/candidates/0/content/parts")
            .and_then(Value::as_array)
            .map(|parts| parts.iter().filter_map(|p| p["text"].as_str()).collect()),
        ProviderKind::OpenAI => reply
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(|s| vec![s]),
        ProviderKind::Anthropic => reply["content"].as_array().map(|blocks| {
            blocks
                .iter()
                .filter(|b| b["type"] == "text")
                .filter_map(|b| b["text"].as_str())
                .collect()
        }),
        ProviderKind::Cohere => reply
            .pointer("/message/content")
            .and_then(Value::as_array)
            .map(|blocks| blocks.iter().filter_map(|b| b["text"].as_str()).collect()),
    };
    match parts {
        Some(p) if !p.is_empty() => Ok(p.concat()),
        Some(_) => bail!("{} returned an empty completion", kind),
        None => Err(anyhow!("Invalid {} response: no completion text", kind)),
    }
}
