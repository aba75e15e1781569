//! Conversation orchestrator.
//!
//! The top-level state machine. It drives Fetch and Index once per
//! repository, then answers questions until the user is done:
//!
//! ```text
//! Start ─▶ ParseLocator ─▶ FetchRepo ─▶ BuildIndex ─▶ CollectQuestion ◀─────┐
//!               │              │            │               │              │
//!               ▼              ▼            ▼               ▼          (yes)│
//!           ErrorExit ◀────────┴────────────┘         PlanResearch         │
//!               │                                           │              │
//!               ▼                                           ▼              │
//!              End ◀── EndConversation ◀──(no)── AskContinue ◀── Respond ◀─ ResearchLoop ⟲
//! ```
//!
//! CollectQuestion and AskContinue are the suspension points. Instead of
//! reading input, [`ConversationGraph::run`] returns
//! [`RunOutcome::NeedsInput`] and the caller answers with
//! [`ConversationGraph::resume`]. Unusable input (a blank question, an answer
//! that is not yes/no) re-suspends at the same node and leaves the state
//! untouched.
//!
//! Every node produces a [`ConversationUpdate`] that is merged into the
//! state: messages are only ever appended, documents are cleared or merged,
//! all other fields are overwritten when present. Every edge is checked
//! against [`Node::valid_transitions`] and recorded.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::artifacts::ArtifactStore;
use crate::config::Config;
use crate::fetch::FetchOrchestrator;
use crate::github::{GitHubClient, RepoSource};
use crate::index::IndexOrchestrator;
use crate::llm::{complete_as, CompletionOptions};
use crate::locator::parse_locator;
use crate::models::{merge_documents, Document, Message, RepoLocator, Role};
use crate::progress::{FetchProgressReporter, NoProgress};
use crate::prompts;
use crate::provider::{ProviderKind, Providers};
use crate::research::ResearchOrchestrator;
use crate::retriever::Retriever;
use crate::store::{SqliteVectorStore, VectorStore};

/// Plans longer than this are cut.
pub const MAX_RESEARCH_STEPS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Node {
    Start,
    ParseLocator,
    FetchRepo,
    BuildIndex,
    CollectQuestion,
    PlanResearch,
    ResearchLoop,
    Respond,
    AskContinue,
    ErrorExit,
    EndConversation,
    End,
}

impl Node {
    pub fn is_terminal(self) -> bool {
        self == Node::End
    }

    /// Edges leaving this node.
    pub fn valid_transitions(self) -> &'static [Node] {
        use Node::*;
        match self {
            Start => &[ParseLocator],
            ParseLocator => &[FetchRepo, ErrorExit],
            FetchRepo => &[BuildIndex, ErrorExit],
            BuildIndex => &[CollectQuestion, ErrorExit],
            CollectQuestion => &[PlanResearch, CollectQuestion],
            PlanResearch => &[ResearchLoop],
            ResearchLoop => &[ResearchLoop, Respond],
            Respond => &[AskContinue, ErrorExit],
            AskContinue => &[CollectQuestion, EndConversation, AskContinue],
            ErrorExit | EndConversation => &[End],
            End => &[],
        }
    }
}

/// A recorded edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    pub from: Node,
    pub to: Node,
    pub timestamp: DateTime<Utc>,
    /// Time spent in `from` before leaving it.
    pub elapsed_ms: u64,
}

/// One pass of the research loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchRecord {
    pub step: String,
    pub retriever_id: Uuid,
    pub documents: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationState {
    /// The reference as the user typed it.
    pub locator_input: String,
    pub locator: Option<RepoLocator>,
    pub repo_fetched: bool,
    pub index_ready: bool,
    /// Built once by BuildIndex, shared by every research step.
    #[serde(skip)]
    pub retriever: Option<Retriever>,
    pub messages: Vec<Message>,
    pub pending_question: Option<String>,
    pub research_steps: Vec<String>,
    pub documents: Vec<Document>,
    pub waiting_for_question: bool,
    pub continue_conversation: Option<bool>,
    pub error: Option<String>,
    pub finished: bool,
    pub research_log: Vec<ResearchRecord>,
}

impl ConversationState {
    pub fn new(locator_input: impl Into<String>) -> Self {
        Self {
            locator_input: locator_input.into(),
            ..Default::default()
        }
    }

    /// Supply the first question up front; CollectQuestion will not suspend.
    pub fn with_question(mut self, question: impl Into<String>) -> Self {
        self.pending_question = Some(question.into());
        self
    }

    /// Supply the next yes/no answer up front; AskContinue will not suspend.
    pub fn with_continue(mut self, answer: bool) -> Self {
        self.continue_conversation = Some(answer);
        self
    }

    /// Content of the most recent user message.
    pub fn latest_question(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }

    pub fn apply(&mut self, update: ConversationUpdate) {
        if let Some(v) = update.locator {
            self.locator = Some(v);
        }
        if let Some(v) = update.repo_fetched {
            self.repo_fetched = v;
        }
        if let Some(v) = update.index_ready {
            self.index_ready = v;
        }
        if let Some(v) = update.retriever {
            self.retriever = Some(v);
        }
        self.messages.extend(update.messages);
        if let Some(v) = update.pending_question {
            self.pending_question = v;
        }
        if let Some(v) = update.research_steps {
            self.research_steps = v;
        }
        match update.documents {
            DocumentsPatch::Keep => {}
            DocumentsPatch::Clear => self.documents.clear(),
            DocumentsPatch::Merge(docs) => merge_documents(&mut self.documents, docs),
        }
        if let Some(v) = update.waiting_for_question {
            self.waiting_for_question = v;
        }
        if let Some(v) = update.continue_conversation {
            self.continue_conversation = v;
        }
        if let Some(v) = update.error {
            self.error = v;
        }
        if let Some(v) = update.finished {
            self.finished = v;
        }
        self.research_log.extend(update.research);
    }
}

#[derive(Debug, Clone, Default)]
pub enum DocumentsPatch {
    #[default]
    Keep,
    Clear,
    Merge(Vec<Document>),
}

/// Partial state produced by one node. `None` leaves a field alone;
/// `messages` and `research` are appended.
#[derive(Debug, Clone, Default)]
pub struct ConversationUpdate {
    pub locator: Option<RepoLocator>,
    pub repo_fetched: Option<bool>,
    pub index_ready: Option<bool>,
    pub retriever: Option<Retriever>,
    pub messages: Vec<Message>,
    pub pending_question: Option<Option<String>>,
    pub research_steps: Option<Vec<String>>,
    pub documents: DocumentsPatch,
    pub waiting_for_question: Option<bool>,
    pub continue_conversation: Option<Option<bool>>,
    pub error: Option<Option<String>>,
    pub finished: Option<bool>,
    pub research: Vec<ResearchRecord>,
}

impl ConversationUpdate {
    fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(Some(message.into())),
            ..Default::default()
        }
    }
}

/// What the machine is waiting for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interrupt {
    Question { prompt: String },
    Continue { prompt: String },
}

impl Interrupt {
    pub fn prompt(&self) -> &str {
        match self {
            Interrupt::Question { prompt } | Interrupt::Continue { prompt } => prompt,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    NeedsInput(Interrupt),
    Finished,
}

enum Step {
    Next(ConversationUpdate, Node),
    Suspend(Interrupt),
}

/// Capabilities the conversation runs against.
#[derive(Clone)]
pub struct Services {
    pub repo_source: Arc<dyn RepoSource>,
    pub providers: Providers,
    pub store: Arc<dyn VectorStore>,
    pub artifacts: ArtifactStore,
    pub progress: Arc<dyn FetchProgressReporter>,
}

impl Services {
    pub fn new(
        repo_source: Arc<dyn RepoSource>,
        providers: Providers,
        store: Arc<dyn VectorStore>,
        artifacts: ArtifactStore,
    ) -> Self {
        Self {
            repo_source,
            providers,
            store,
            artifacts,
            progress: Arc::new(NoProgress),
        }
    }

    /// Production wiring: GitHub over HTTP, providers with API keys, the
    /// SQLite store and artifact directory from `[paths]`.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            Arc::new(GitHubClient::new(&config.github)?),
            Providers::from_config(config)?,
            Arc::new(SqliteVectorStore::new(&config.paths.store_dir)),
            ArtifactStore::new(&config.paths.artifacts_dir),
        ))
    }

    pub fn with_progress(mut self, progress: Arc<dyn FetchProgressReporter>) -> Self {
        self.progress = progress;
        self
    }
}

/// `yes`/`y` → true, `no`/`n` → false, case-insensitive; anything else → None.
pub fn parse_yes_no(input: &str) -> Option<bool> {
    match input.trim().to_lowercase().as_str() {
        "yes" | "y" => Some(true),
        "no" | "n" => Some(false),
        _ => None,
    }
}

/// Render documents as the context block of the response prompt.
pub fn format_docs(docs: &[Document]) -> String {
    if docs.is_empty() {
        return "No relevant documents were found in the repository.".to_string();
    }
    docs.iter()
        .map(|d| format!("<document source=\"{}\">\n{}\n</document>", d.source(), d.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub struct ConversationGraph {
    config: Arc<Config>,
    services: Services,
    llm_provider: ProviderKind,
    embedding_provider: ProviderKind,
    options: CompletionOptions,
    state: ConversationState,
    node: Node,
    pending: Option<Interrupt>,
    transitions: Vec<Transition>,
}

impl ConversationGraph {
    pub fn new(config: Arc<Config>, services: Services, state: ConversationState) -> Self {
        Self {
            llm_provider: config.llm.provider,
            embedding_provider: config.embedding.provider,
            options: CompletionOptions::default().streaming(config.llm.streaming),
            config,
            services,
            state,
            node: Node::Start,
            pending: None,
            transitions: Vec::new(),
        }
    }

    pub fn with_llm_provider(mut self, kind: ProviderKind) -> Self {
        self.llm_provider = kind;
        self
    }

    pub fn with_embedding_provider(mut self, kind: ProviderKind) -> Self {
        self.embedding_provider = kind;
        self
    }

    pub fn with_options(mut self, options: CompletionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn into_state(self) -> ConversationState {
        self.state
    }

    pub fn node(&self) -> Node {
        self.node
    }

    pub fn pending(&self) -> Option<&Interrupt> {
        self.pending.as_ref()
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Advance until the machine needs input or reaches End. Calling it
    /// again while input is pending returns the same interrupt.
    pub async fn run(&mut self) -> RunOutcome {
        if let Some(interrupt) = &self.pending {
            return RunOutcome::NeedsInput(interrupt.clone());
        }
        loop {
            if self.node.is_terminal() {
                return RunOutcome::Finished;
            }
            let started = Instant::now();
            match self.step(self.node).await {
                Step::Suspend(interrupt) => {
                    tracing::debug!(node = ?self.node, "suspended for input");
                    self.pending = Some(interrupt.clone());
                    return RunOutcome::NeedsInput(interrupt);
                }
                Step::Next(update, next) => {
                    self.state.apply(update);
                    self.transition(next, started);
                }
            }
        }
    }

    /// Answer the pending interrupt and keep running.
    pub async fn resume(&mut self, input: &str) -> Result<RunOutcome> {
        let Some(interrupt) = self.pending.take() else {
            bail!("conversation is not waiting for input");
        };

        let accepted = match &interrupt {
            Interrupt::Question { .. } if !input.trim().is_empty() => {
                self.state.pending_question = Some(input.trim().to_string());
                true
            }
            Interrupt::Continue { .. } => match parse_yes_no(input) {
                Some(answer) => {
                    self.state.continue_conversation = Some(answer);
                    true
                }
                None => false,
            },
            Interrupt::Question { .. } => false,
        };

        if !accepted {
            tracing::debug!(node = ?self.node, "unusable input, asking again");
            self.transition(self.node, Instant::now());
            self.pending = Some(interrupt.clone());
            return Ok(RunOutcome::NeedsInput(interrupt));
        }
        Ok(self.run().await)
    }

    fn transition(&mut self, next: Node, started: Instant) {
        let from = self.node;
        let to = if from.valid_transitions().contains(&next) {
            next
        } else {
            tracing::error!(?from, ?next, "illegal transition");
            self.state.error = Some(format!("internal error: illegal transition {:?} -> {:?}", from, next));
            Node::ErrorExit
        };
        tracing::info!(?from, ?to, "transition");
        self.transitions.push(Transition {
            from,
            to,
            timestamp: Utc::now(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        });
        self.node = to;
    }

    async fn step(&self, node: Node) -> Step {
        match node {
            Node::Start => Step::Next(ConversationUpdate::default(), Node::ParseLocator),
            Node::ParseLocator => self.parse_locator(),
            Node::FetchRepo => self.fetch_repo().await,
            Node::BuildIndex => self.build_index().await,
            Node::CollectQuestion => self.collect_question(),
            Node::PlanResearch => self.plan_research().await,
            Node::ResearchLoop => self.research_step().await,
            Node::Respond => self.respond().await,
            Node::AskContinue => self.ask_continue(),
            Node::ErrorExit => self.error_exit(),
            Node::EndConversation => Step::Next(
                ConversationUpdate {
                    messages: vec![Message::assistant(prompts::GOODBYE)],
                    finished: Some(true),
                    ..Default::default()
                },
                Node::End,
            ),
            Node::End => Step::Next(ConversationUpdate::default(), Node::End),
        }
    }

    fn parse_locator(&self) -> Step {
        match parse_locator(&self.state.locator_input) {
            Ok(locator) => {
                tracing::info!(repo = %locator, "parsed locator");
                Step::Next(
                    ConversationUpdate {
                        locator: Some(locator),
                        error: Some(None),
                        ..Default::default()
                    },
                    Node::FetchRepo,
                )
            }
            Err(e) => Step::Next(ConversationUpdate::error(e.to_string()), Node::ErrorExit),
        }
    }

    async fn fetch_repo(&self) -> Step {
        let fail = |e: String| {
            Step::Next(
                ConversationUpdate {
                    repo_fetched: Some(false),
                    ..ConversationUpdate::error(format!("Failed to fetch repository: {}", e))
                },
                Node::ErrorExit,
            )
        };
        let Some(locator) = &self.state.locator else {
            return fail("no repository locator".to_string());
        };
        let chat = match self.services.providers.chat(self.llm_provider) {
            Ok(chat) => chat,
            Err(e) => return fail(e.to_string()),
        };
        let fetcher = match FetchOrchestrator::new(
            Arc::clone(&self.config),
            Arc::clone(&self.services.repo_source),
            chat,
            self.services.artifacts.clone(),
        ) {
            Ok(f) => f
                .with_progress(Arc::clone(&self.services.progress))
                .with_options(self.options.clone()),
            Err(e) => return fail(e.to_string()),
        };

        match fetcher.run(locator).await {
            Ok(fetched) => match fetched.files {
                Some(files) => {
                    tracing::info!(repo = %locator, files = files.len(), "repository fetched");
                    Step::Next(
                        ConversationUpdate {
                            repo_fetched: Some(true),
                            error: Some(None),
                            ..Default::default()
                        },
                        Node::BuildIndex,
                    )
                }
                None => fail("the fetcher did not return any files".to_string()),
            },
            Err(e) => {
                tracing::error!(repo = %locator, error = %e, "fetch failed");
                fail(e.to_string())
            }
        }
    }

    async fn build_index(&self) -> Step {
        let indexer = IndexOrchestrator::new(
            Arc::clone(&self.config),
            self.services.providers.clone(),
            Arc::clone(&self.services.store),
            self.services.artifacts.clone(),
        );
        let result = indexer.run(self.embedding_provider).await;

        match result.retriever {
            Some(retriever) if result.retriever_ready => Step::Next(
                ConversationUpdate {
                    index_ready: Some(true),
                    retriever: Some(retriever),
                    waiting_for_question: Some(true),
                    error: Some(None),
                    ..Default::default()
                },
                Node::CollectQuestion,
            ),
            _ => {
                let reason = result
                    .error
                    .unwrap_or_else(|| "retriever was not created".to_string());
                Step::Next(
                    ConversationUpdate {
                        index_ready: Some(false),
                        ..ConversationUpdate::error(format!(
                            "Failed to create vector index: {}",
                            reason
                        ))
                    },
                    Node::ErrorExit,
                )
            }
        }
    }

    fn collect_question(&self) -> Step {
        match self.state.pending_question.as_deref().map(str::trim) {
            Some(q) if !q.is_empty() => Step::Next(
                ConversationUpdate {
                    messages: vec![Message::user(q)],
                    pending_question: Some(None),
                    waiting_for_question: Some(false),
                    ..Default::default()
                },
                Node::PlanResearch,
            ),
            _ => Step::Suspend(Interrupt::Question {
                prompt: prompts::QUESTION_PROMPT.to_string(),
            }),
        }
    }

    async fn plan_research(&self) -> Step {
        #[derive(Deserialize)]
        struct Plan {
            steps: Vec<String>,
        }
        let schema = json!({
            "type": "object",
            "properties": {
                "steps": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["steps"]
        });

        let mut messages = vec![Message::system(prompts::RESEARCH_PLAN)];
        messages.extend(self.state.messages.iter().cloned());

        let planned = match self.services.providers.chat(self.llm_provider) {
            Ok(chat) => complete_as::<Plan>(chat.as_ref(), &messages, &schema, &self.options)
                .await
                .map(|p| p.steps),
            Err(e) => Err(e),
        };

        let mut steps: Vec<String> = match planned {
            Ok(steps) => steps
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "research planning failed, researching the question directly");
                Vec::new()
            }
        };
        steps.truncate(MAX_RESEARCH_STEPS);
        if steps.is_empty() {
            steps.push(self.state.latest_question().unwrap_or_default().to_string());
        }
        tracing::info!(steps = steps.len(), "research plan");

        Step::Next(
            ConversationUpdate {
                research_steps: Some(steps),
                documents: DocumentsPatch::Clear,
                ..Default::default()
            },
            Node::ResearchLoop,
        )
    }

    async fn research_step(&self) -> Step {
        let Some((step, rest)) = self.state.research_steps.split_first() else {
            return Step::Next(ConversationUpdate::default(), Node::Respond);
        };

        let (documents, record) = match (
            &self.state.retriever,
            self.services.providers.chat(self.llm_provider),
        ) {
            (Some(retriever), Ok(chat)) => {
                let research = ResearchOrchestrator::new(Arc::clone(&self.config), chat)
                    .with_options(self.options.clone());
                let found = research.run(step, retriever).await.documents;
                let record = ResearchRecord {
                    step: step.clone(),
                    retriever_id: retriever.id(),
                    documents: found.len(),
                };
                (found, vec![record])
            }
            (None, _) => {
                tracing::warn!(%step, "no retriever, skipping research step");
                (Vec::new(), Vec::new())
            }
            (_, Err(e)) => {
                tracing::warn!(%step, error = %e, "no language model, skipping research step");
                (Vec::new(), Vec::new())
            }
        };

        let next = if rest.is_empty() {
            Node::Respond
        } else {
            Node::ResearchLoop
        };
        Step::Next(
            ConversationUpdate {
                research_steps: Some(rest.to_vec()),
                documents: DocumentsPatch::Merge(documents),
                research: record,
                ..Default::default()
            },
            next,
        )
    }

    async fn respond(&self) -> Step {
        let mut messages = vec![Message::system(prompts::response_prompt(&format_docs(
            &self.state.documents,
        )))];
        messages.extend(self.state.messages.iter().cloned());

        let reply = match self.services.providers.chat(self.llm_provider) {
            Ok(chat) => chat.complete(&messages, &self.options).await,
            Err(e) => Err(e),
        };
        match reply {
            Ok(answer) => Step::Next(
                ConversationUpdate {
                    messages: vec![Message::assistant(format!(
                        "{}{}",
                        answer,
                        prompts::CONTINUE_SUFFIX
                    ))],
                    ..Default::default()
                },
                Node::AskContinue,
            ),
            Err(e) => {
                tracing::error!(error = %e, "response generation failed");
                Step::Next(
                    ConversationUpdate::error(format!("Failed to generate a response: {}", e)),
                    Node::ErrorExit,
                )
            }
        }
    }

    fn ask_continue(&self) -> Step {
        match self.state.continue_conversation {
            Some(true) => Step::Next(
                ConversationUpdate {
                    continue_conversation: Some(None),
                    waiting_for_question: Some(true),
                    documents: DocumentsPatch::Clear,
                    ..Default::default()
                },
                Node::CollectQuestion,
            ),
            Some(false) => Step::Next(
                ConversationUpdate {
                    continue_conversation: Some(None),
                    waiting_for_question: Some(false),
                    ..Default::default()
                },
                Node::EndConversation,
            ),
            None => Step::Suspend(Interrupt::Continue {
                prompt: prompts::CONTINUE_PROMPT.to_string(),
            }),
        }
    }

    fn error_exit(&self) -> Step {
        let error = self.state.error.as_deref().unwrap_or("unknown error");
        Step::Next(
            ConversationUpdate {
                messages: vec![Message::assistant(prompts::error_message(error))],
                finished: Some(true),
                ..Default::default()
            },
            Node::End,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_yes_no() {
        assert_eq!(parse_yes_no("YES"), Some(true));
        assert_eq!(parse_yes_no(" y "), Some(true));
        assert_eq!(parse_yes_no("No"), Some(false));
        assert_eq!(parse_yes_no("n"), Some(false));
        assert_eq!(parse_yes_no("maybe"), None);
        assert_eq!(parse_yes_no(""), None);
    }

    #[test]
    fn test_update_appends_messages_and_overwrites_fields() {
        let mut state = ConversationState::new("a/b");
        state.messages.push(Message::user("first"));
        state.apply(ConversationUpdate {
            messages: vec![Message::assistant("second")],
            error: Some(Some("boom".into())),
            ..Default::default()
        });
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.error.as_deref(), Some("boom"));

        state.apply(ConversationUpdate {
            error: Some(None),
            ..Default::default()
        });
        assert!(state.error.is_none());
        assert_eq!(state.messages.len(), 2);
    }

    #[test]
    fn test_documents_patch() {
        let doc = Document::new("x", serde_json::Map::new());
        let mut state = ConversationState::default();
        state.apply(ConversationUpdate {
            documents: DocumentsPatch::Merge(vec![doc.clone(), doc.clone()]),
            ..Default::default()
        });
        assert_eq!(state.documents.len(), 1);
        state.apply(ConversationUpdate::default());
        assert_eq!(state.documents.len(), 1);
        state.apply(ConversationUpdate {
            documents: DocumentsPatch::Clear,
            ..Default::default()
        });
        assert!(state.documents.is_empty());
    }

    #[test]
    fn test_transition_table_is_closed() {
        assert!(Node::End.valid_transitions().is_empty());
        assert!(Node::ErrorExit.valid_transitions().contains(&Node::End));
        assert!(!Node::Respond.valid_transitions().contains(&Node::CollectQuestion));
        assert!(Node::AskContinue
            .valid_transitions()
            .contains(&Node::AskContinue));
    }

    #[test]
    fn test_format_docs_names_sources() {
        let mut meta = serde_json::Map::new();
        meta.insert("source".into(), json!("README.md"));
        let text = format_docs(&[Document::new("Hello", meta)]);
        assert!(text.contains("source=\"README.md\""));
        assert!(text.contains("Hello"));
    }

    #[test]
    fn test_state_serialises_without_retriever() {
        let state = ConversationState::new("octocat/Hello-World").with_question("why?");
        let value = serde_json::to_value(&state).unwrap();
        assert!(value.get("retriever").is_none());
        assert_eq!(value["pending_question"], "why?");
    }
}
