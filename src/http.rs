//! JSON-over-HTTP calls to model vendors.
//!
//! Retry strategy, shared by chat and embedding providers:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, ... (capped at 2^5)

use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::retry::{is_retryable_status, retry_with_backoff, Backoff};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{what} returned {status}: {body}")]
    Status {
        what: String,
        status: u16,
        body: String,
    },
    #[error("{what} request failed: {source}")]
    Transport {
        what: String,
        #[source]
        source: reqwest::Error,
    },
}

impl ApiError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Status { status, .. } => is_retryable_status(*status),
            ApiError::Transport { .. } => true,
        }
    }
}

/// Backoff for `max_retries` retries after the first attempt.
pub fn vendor_backoff(max_retries: u32) -> Backoff {
    Backoff::new(max_retries + 1, Duration::from_secs(1))
}

/// Send the request built by `build` and decode the JSON body, retrying
/// transient failures. `build` is called once per attempt.
pub async fn send_json(
    what: &str,
    backoff: Backoff,
    build: impl Fn() -> reqwest::RequestBuilder,
) -> Result<Value, ApiError> {
    let build = &build;
    retry_with_backoff(backoff, what, ApiError::is_retryable, move || async move {
        let response = build().send().await.map_err(|source| ApiError::Transport {
            what: what.to_string(),
            source,
        })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                what: what.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        response
            .json::<Value>()
            .await
            .map_err(|source| ApiError::Transport {
                what: what.to_string(),
                source,
            })
    })
    .await
}
