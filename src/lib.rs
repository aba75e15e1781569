//! # GitSurfer
//!
//! Ask questions about a GitHub repository in plain language.
//!
//! GitSurfer fetches a repository through the GitHub REST API, summarises its
//! layout with a language model, indexes the files in a local vector store,
//! and then answers questions by planning a few research steps, retrieving
//! the relevant segments and writing an answer grounded in them.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────────┐
//! │  GitHub  │──▶│  Fetch   │──▶│  Index   │──▶│ SQLite store │
//! │ REST API │   │ tree+files│  │ split+emb│   │ per provider │
//! └──────────┘   └──────────┘   └──────────┘   └──────┬───────┘
//!                                                     │
//!                    ┌──────────────┐          ┌──────┴─────┐
//!                    │ Conversation │─────────▶│  Research  │
//!                    │ plan/respond │          │ multi-query│
//!                    └──────┬───────┘          └────────────┘
//!                           │
//!                    ┌──────┴───────┐
//!                    │   Session    │
//!                    │ (stdin/out)  │
//!                    └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export GOOGLE_API_KEY=...
//! gitsurfer chat octocat/Hello-World
//! gitsurfer chat https://github.com/tokio-rs/tokio/tree/master --question "How is the scheduler organised?"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`logging`] | tracing subscriber setup |
//! | [`error`] | Typed errors |
//! | [`models`] | Core data types |
//! | [`locator`] | Repository reference parsing |
//! | [`provider`] | Provider enum and capability registry |
//! | [`github`] | GitHub tree and contents client |
//! | [`http`] | Shared JSON request helper |
//! | [`llm`] | Chat completion |
//! | [`embedding`] | Embeddings and vector utilities |
//! | [`chunk`] | Overlapping text splitter |
//! | [`artifacts`] | Fetched artifacts on disk |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`store`] | Vector stores |
//! | [`retriever`] | Retriever handle |
//! | [`retry`] | Exponential backoff |
//! | [`progress`] | Fetch progress reporting |
//! | [`prompts`] | System prompts |
//! | [`fetch`] | Fetch orchestrator |
//! | [`index`] | Index orchestrator |
//! | [`research`] | Research orchestrator |
//! | [`conversation`] | Conversation state machine |
//! | [`session`] | Interactive loop |

pub mod artifacts;
pub mod chunk;
pub mod config;
pub mod conversation;
pub mod db;
pub mod embedding;
pub mod error;
pub mod fetch;
pub mod github;
pub mod http;
pub mod index;
pub mod llm;
pub mod locator;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod prompts;
pub mod provider;
pub mod research;
pub mod retriever;
pub mod retry;
pub mod session;
pub mod store;
