//! Repository locator parsing.
//!
//! Accepted forms, tried in order (first match wins):
//!
//! | Form | Example |
//! |------|---------|
//! | Full URL, optional `/tree/<branch>` and trailing path | `https://github.com/rust-lang/cargo/tree/dev/src` |
//! | URL without scheme | `github.com/rust-lang/cargo` |
//! | Bare owner/repo, optional `/tree/<branch>` | `rust-lang/cargo` |
//!
//! A trailing `.git` on the repository name is removed. The branch falls back
//! to [`DEFAULT_BRANCH`](crate::models::DEFAULT_BRANCH).

use regex::Regex;
use std::sync::OnceLock;

use crate::error::LocatorError;
use crate::models::RepoLocator;

const NAME: &str = r"[A-Za-z0-9_.-]+";

fn patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let tail = r"(?:/tree/(?P<branch>[^/\s]+))?(?:/[^\s]*)?/?$";
        [
            format!(r"^https?://(?:www\.)?github\.com/(?P<owner>{NAME})/(?P<repo>{NAME}){tail}"),
            format!(r"^(?:www\.)?github\.com/(?P<owner>{NAME})/(?P<repo>{NAME}){tail}"),
            format!(r"^(?P<owner>{NAME})/(?P<repo>{NAME})(?:/tree/(?P<branch>[^/\s]+))?/?$"),
        ]
        .iter()
        .map(|p| Regex::new(p).expect("locator pattern compiles"))
        .collect()
    })
}

/// Parse a repository reference into a [`RepoLocator`].
pub fn parse_locator(input: &str) -> Result<RepoLocator, LocatorError> {
    let trimmed = input.trim();
    let invalid = || LocatorError {
        input: input.to_string(),
    };

    let caps = patterns()
        .iter()
        .find_map(|re| re.captures(trimmed))
        .ok_or_else(invalid)?;

    let owner = &caps["owner"];
    let repo = caps["repo"].strip_suffix(".git").unwrap_or(&caps["repo"]);
    if owner.is_empty() || repo.is_empty() {
        return Err(invalid());
    }

    let locator = RepoLocator::new(owner, repo);
    Ok(match caps.name("branch") {
        Some(b) => locator.with_branch(b.as_str()),
        None => locator,
    })
}
