//! Repository host capability.
//!
//! [`RepoSource`] is what the Fetch orchestrator needs from a host: a
//! recursive tree listing and single-file contents. [`GitHubClient`]
//! implements it with the GitHub REST API:
//!
//! - `GET /repos/{owner}/{repo}/git/trees/{branch}?recursive=1`
//! - `GET /repos/{owner}/{repo}/contents/{path}?ref={branch}`
//!
//! File contents arrive base64-encoded and are decoded transparently.
//! Retrying is the caller's business; every method here makes one request.

use anyhow::Result;
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use std::time::Duration;

use crate::config::GithubConfig;
use crate::error::FetchError;
use crate::models::{EntryKind, RepoLocator, TreeEntry};

#[async_trait]
pub trait RepoSource: Send + Sync {
    async fn list_tree(&self, locator: &RepoLocator) -> Result<Vec<TreeEntry>, FetchError>;

    async fn fetch_file(&self, locator: &RepoLocator, path: &str) -> Result<String, FetchError>;
}

pub struct GitHubClient {
    client: reqwest::Client,
    api_base: String,
    token: Option<String>,
}

#[derive(Deserialize)]
struct TreeResponse {
    tree: Vec<RawTreeItem>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Deserialize)]
struct RawTreeItem {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
struct ContentResponse {
    #[serde(default)]
    encoding: Option<String>,
    #[serde(default)]
    content: String,
}

impl GitHubClient {
    pub fn new(config: &GithubConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("gitsurfer/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn url(
        &self,
        what: &str,
        segments: &[&str],
        query: (&str, &str),
    ) -> Result<reqwest::Url, FetchError> {
        let decode = |reason: &str| FetchError::Decode {
            what: what.to_string(),
            reason: reason.to_string(),
        };
        let mut url = reqwest::Url::parse(&self.api_base).map_err(|e| decode(&e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| decode("api_base cannot be a base URL"))?
            .pop_if_empty()
            .extend(segments);
        url.query_pairs_mut().append_pair(query.0, query.1);
        Ok(url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        what: &str,
        url: reqwest::Url,
    ) -> Result<T, FetchError> {
        let mut req = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github.v3+json");
        if let Some(token) = &self.token {
            req = req.header("Authorization", format!("token {}", token));
        }

        let transport = |e: reqwest::Error| FetchError::Transport {
            what: what.to_string(),
            source: e.into(),
        };
        let response = req.send().await.map_err(transport)?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Network {
                what: what.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        let bytes = response.bytes().await.map_err(transport)?;
        serde_json::from_slice(&bytes).map_err(|e| FetchError::Decode {
            what: what.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl RepoSource for GitHubClient {
    async fn list_tree(&self, locator: &RepoLocator) -> Result<Vec<TreeEntry>, FetchError> {
        let url = self.url(
            "tree",
            &[
                "repos",
                locator.owner.as_str(),
                locator.repo.as_str(),
                "git",
                "trees",
                locator.branch.as_str(),
            ],
            ("recursive", "1"),
        )?;
        let resp: TreeResponse = self.get_json("tree", url).await?;
        if resp.truncated {
            tracing::warn!(repo = %locator, "tree listing truncated by GitHub");
        }
        Ok(resp
            .tree
            .into_iter()
            .filter_map(|item| {
                let kind = match item.kind.as_str() {
                    "blob" => EntryKind::Blob,
                    "tree" => EntryKind::Tree,
                    // submodule commits carry no content
                    _ => return None,
                };
                Some(TreeEntry {
                    path: item.path,
                    kind,
                })
            })
            .collect())
    }

    async fn fetch_file(&self, locator: &RepoLocator, path: &str) -> Result<String, FetchError> {
        let mut segments = vec![
            "repos",
            locator.owner.as_str(),
            locator.repo.as_str(),
            "contents",
        ];
        segments.extend(path.split('/'));
        let url = self.url(path, &segments, ("ref", &locator.branch))?;
        let resp: ContentResponse = self.get_json(path, url).await?;
        match resp.encoding.as_deref() {
            Some("base64") => decode_base64(&resp.content).map_err(|reason| FetchError::Decode {
                what: path.to_string(),
                reason,
            }),
            _ => Ok(resp.content),
        }
    }
}

/// Decode GitHub's line-wrapped base64. Invalid UTF-8 is replaced, not fatal.
pub fn decode_base64(content: &str) -> Result<String, String> {
    let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| e.to_string())?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
