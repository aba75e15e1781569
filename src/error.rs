//! Error taxonomy for the orchestrators.
//!
//! Capability glue (HTTP, SQLite, files) uses `anyhow`. The variants here are
//! the errors that orchestrators classify and route on: a malformed locator,
//! a failed tree listing versus a failed single file, and the two index
//! failures. Research and yes/no input problems never surface as errors; they
//! are absorbed by the orchestrators that encounter them.

use thiserror::Error;

/// The repository reference did not match any accepted format.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid GitHub URL format: {input}")]
pub struct LocatorError {
    pub input: String,
}

/// Failures while talking to the repository host.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The host answered with a non-success HTTP status.
    #[error("Error fetching {what}: {status} - {body}")]
    Network {
        what: String,
        status: u16,
        body: String,
    },
    /// The request never produced a response (DNS, TLS, timeout, ...).
    #[error("Request for {what} failed: {source}")]
    Transport {
        what: String,
        #[source]
        source: anyhow::Error,
    },
    /// The response body was not in the expected shape.
    #[error("Could not decode {what}: {reason}")]
    Decode { what: String, reason: String },
    /// Writing a side-channel artifact failed.
    #[error("Could not write artifact: {0}")]
    Artifact(#[source] anyhow::Error),
}

impl FetchError {
    /// HTTP status of a [`FetchError::Network`] failure.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Network { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Failures of the Index orchestrator.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Fetch has not produced both artifacts. Not retryable.
    #[error("Required files not found")]
    MissingArtifacts,
    /// Loading, splitting, embedding or persisting failed.
    #[error("{0:#}")]
    Ingest(#[source] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_error_message_carries_status_and_body() {
        let err = FetchError::Network {
            what: "tree".to_string(),
            status: 404,
            body: "Not Found".to_string(),
        };
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.to_string(), "Error fetching tree: 404 - Not Found");
    }

    #[test]
    fn test_missing_artifacts_message() {
        assert_eq!(
            IndexError::MissingArtifacts.to_string(),
            "Required files not found"
        );
    }
}
