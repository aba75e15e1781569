//! Chat and embedding clients against a local server speaking the vendor
//! wire formats.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use gitsurfer::config::{EmbeddingConfig, LlmConfig};
use gitsurfer::embedding::{Embedder, HttpEmbedder};
use gitsurfer::llm::{complete_as, ChatModel, CompletionCallback, CompletionOptions, HttpChatModel};
use gitsurfer::models::Message;
use gitsurfer::provider::ProviderKind;

#[derive(Clone, Default)]
struct Vendor {
    calls: Arc<AtomicUsize>,
    /// Respond 429 to this many calls before succeeding.
    rate_limited: usize,
    /// Always respond with this status.
    fail_with: Option<u16>,
    last_body: Arc<Mutex<Value>>,
    last_auth: Arc<Mutex<String>>,
}

impl Vendor {
    fn record(&self, headers: &HeaderMap, body: &Value) -> Option<Response> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_body.lock().unwrap() = body.clone();
        let auth = headers
            .get("authorization")
            .or_else(|| headers.get("x-api-key"))
            .or_else(|| headers.get("x-goog-api-key"))
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        *self.last_auth.lock().unwrap() = auth;

        if let Some(status) = self.fail_with {
            let status = StatusCode::from_u16(status).unwrap();
            return Some((status, "nope").into_response());
        }
        if n < self.rate_limited {
            return Some((StatusCode::TOO_MANY_REQUESTS, "slow down").into_response());
        }
        None
    }
}

async fn openai_chat(State(v): State<Vendor>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if let Some(r) = v.record(&headers, &body) {
        return r;
    }
    let last = body["messages"].as_array().unwrap().last().unwrap()["content"].clone();
    Json(json!({
        "choices": [{ "index": 0, "message": { "role": "assistant", "content": format!("echo: {}", last.as_str().unwrap()) } }]
    }))
    .into_response()
}

async fn anthropic_messages(
    State(v): State<Vendor>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Some(r) = v.record(&headers, &body) {
        return r;
    }
    Json(json!({
        "content": [
            { "type": "text", "text": "```json\n{\"steps\": [\"a\", \"b\"]}\n```" }
        ]
    }))
    .into_response()
}

async fn gemini_embed(
    State(v): State<Vendor>,
    Path(action): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !action.ends_with(":batchEmbedContents") {
        return StatusCode::NOT_FOUND.into_response();
    }
    if let Some(r) = v.record(&headers, &body) {
        return r;
    }
    let embeddings: Vec<Value> = body["requests"]
        .as_array()
        .unwrap()
        .iter()
        .enumerate()
        .map(|(i, _)| json!({ "values": [i as f64, 1.0, 0.5] }))
        .collect();
    Json(json!({ "embeddings": embeddings })).into_response()
}

async fn openai_embed(State(v): State<Vendor>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if let Some(r) = v.record(&headers, &body) {
        return r;
    }
    // deliberately out of order
    Json(json!({
        "data": [
            { "index": 1, "embedding": [0.0, 1.0] },
            { "index": 0, "embedding": [1.0, 0.0] }
        ]
    }))
    .into_response()
}

async fn cohere_embed(State(v): State<Vendor>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if let Some(r) = v.record(&headers, &body) {
        return r;
    }
    let rows: Vec<Value> = body["texts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|_| json!([0.25, 0.75]))
        .collect();
    Json(json!({ "embeddings": { "float": rows } })).into_response()
}

async fn serve(vendor: Vendor) -> String {
    let app = Router::new()
        .route("/v1/chat/completions", post(openai_chat))
        .route("/v1/messages", post(anthropic_messages))
        .route("/v1/embeddings", post(openai_embed))
        .route("/v2/embed", post(cohere_embed))
        .route("/v1beta/models/{action}", post(gemini_embed))
        .with_state(vendor);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn chat(kind: ProviderKind, base: &str) -> HttpChatModel {
    HttpChatModel::new(kind, "test-key".into(), &LlmConfig::default())
        .unwrap()
        .with_base_url(base)
}

#[tokio::test]
async fn test_openai_chat_round_trip() {
    let vendor = Vendor::default();
    let base = serve(vendor.clone()).await;
    let model = chat(ProviderKind::OpenAI, &base);

    let reply = model
        .complete(
            &[Message::system("be brief"), Message::user("hi there")],
            &CompletionOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(reply, "echo: hi there");
    assert_eq!(*vendor.last_auth.lock().unwrap(), "Bearer test-key");
    let body = vendor.last_body.lock().unwrap().clone();
    assert_eq!(body["model"], "gpt-4o");
    assert_eq!(body["messages"][0]["role"], "system");
}

#[tokio::test]
async fn test_rate_limit_is_retried() {
    let vendor = Vendor {
        rate_limited: 1,
        ..Vendor::default()
    };
    let base = serve(vendor.clone()).await;
    let reply = chat(ProviderKind::OpenAI, &base)
        .complete(&[Message::user("again")], &CompletionOptions::default())
        .await
        .unwrap();
    assert_eq!(reply, "echo: again");
    assert_eq!(vendor.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_client_error_fails_without_retry() {
    let vendor = Vendor {
        fail_with: Some(401),
        ..Vendor::default()
    };
    let base = serve(vendor.clone()).await;
    let err = chat(ProviderKind::OpenAI, &base)
        .complete(&[Message::user("hi")], &CompletionOptions::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("401"));
    assert_eq!(vendor.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_anthropic_structured_reply_in_code_fence() {
    #[derive(serde::Deserialize)]
    struct Plan {
        steps: Vec<String>,
    }

    let vendor = Vendor::default();
    let base = serve(vendor.clone()).await;
    let model = chat(ProviderKind::Anthropic, &base);
    let schema = json!({"type": "object", "properties": {"steps": {"type": "array"}}});

    let plan: Plan = complete_as(
        &model,
        &[Message::system("plan it"), Message::user("how?")],
        &schema,
        &CompletionOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(plan.steps, vec!["a", "b"]);
    assert_eq!(*vendor.last_auth.lock().unwrap(), "test-key");
    let body = vendor.last_body.lock().unwrap().clone();
    assert!(body["system"].as_str().unwrap().starts_with("plan it"));
    assert_eq!(body["messages"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_streaming_delivers_lines_to_callbacks() {
    struct Collect(Mutex<Vec<String>>);
    impl CompletionCallback for Collect {
        fn on_text(&self, text: &str) {
            self.0.lock().unwrap().push(text.to_string());
        }
    }

    let base = serve(Vendor::default()).await;
    let collected = Arc::new(Collect(Mutex::new(Vec::new())));
    let opts = CompletionOptions::default()
        .streaming(true)
        .with_callback(collected.clone());

    chat(ProviderKind::OpenAI, &base)
        .complete(&[Message::user("one\ntwo")], &opts)
        .await
        .unwrap();

    assert_eq!(
        *collected.0.lock().unwrap(),
        vec!["echo: one\n".to_string(), "two".to_string()]
    );
}

#[tokio::test]
async fn test_gemini_batch_embeddings() {
    let vendor = Vendor::default();
    let base = serve(vendor.clone()).await;
    let embedder = HttpEmbedder::new(ProviderKind::Gemini, "g-key".into(), &EmbeddingConfig::default())
        .unwrap()
        .with_base_url(&base);

    let vectors = embedder
        .embed(&["a".to_string(), "b".to_string(), "c".to_string()])
        .await
        .unwrap();

    assert_eq!(vectors.len(), 3);
    assert_eq!(vectors[2], vec![2.0, 1.0, 0.5]);
    assert_eq!(*vendor.last_auth.lock().unwrap(), "g-key");
    let body = vendor.last_body.lock().unwrap().clone();
    assert_eq!(body["requests"][0]["model"], "models/text-embedding-004");
}

#[tokio::test]
async fn test_openai_embeddings_follow_index_order() {
    let base = serve(Vendor::default()).await;
    let embedder = HttpEmbedder::new(ProviderKind::OpenAI, "k".into(), &EmbeddingConfig::default())
        .unwrap()
        .with_base_url(&base);

    let vectors = embedder
        .embed(&["first".to_string(), "second".to_string()])
        .await
        .unwrap();
    assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
}

#[tokio::test]
async fn test_cohere_queries_use_search_query_input_type() {
    let vendor = Vendor::default();
    let base = serve(vendor.clone()).await;
    let embedder = HttpEmbedder::new(ProviderKind::Cohere, "co-key".into(), &EmbeddingConfig::default())
        .unwrap()
        .with_base_url(&base);

    embedder.embed(&["stored segment".to_string()]).await.unwrap();
    assert_eq!(vendor.last_body.lock().unwrap()["input_type"], "search_document");

    let vector = embedder.embed_query("where is main?").await.unwrap();
    assert_eq!(vector, vec![0.25, 0.75]);
    let body = vendor.last_body.lock().unwrap().clone();
    assert_eq!(body["input_type"], "search_query");
    assert_eq!(body["texts"], json!(["where is main?"]));
    assert_eq!(*vendor.last_auth.lock().unwrap(), "Bearer co-key");
}
