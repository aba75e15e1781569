//! The interactive loop over in-memory input and output.

mod common;

use std::io::Cursor;
use std::sync::Arc;
use tempfile::TempDir;

use common::{hello_world, services, test_config, FakeEmbedder, ScriptedChat};
use gitsurfer::conversation::{ConversationGraph, ConversationState};
use gitsurfer::prompts;
use gitsurfer::session::drive;

fn graph(dir: &TempDir, state: ConversationState) -> ConversationGraph {
    let config = test_config(dir.path());
    let services = services(
        &config,
        Arc::new(hello_world()),
        Arc::new(ScriptedChat::new()),
        Arc::new(FakeEmbedder::default()),
    );
    ConversationGraph::new(Arc::new(config), services, state)
}

#[tokio::test]
async fn test_scripted_session_prints_answers_and_prompts() {
    let dir = TempDir::new().unwrap();
    let mut graph = graph(&dir, ConversationState::new("octocat/Hello-World"));
    let input = Cursor::new("\nWhat is this?\nperhaps\nno\n");
    let mut out = Vec::new();

    let state = drive(&mut graph, input, &mut out).await.unwrap();
    let out = String::from_utf8(out).unwrap();

    assert!(state.finished);
    assert_eq!(out.matches(prompts::QUESTION_PROMPT).count(), 2);
    assert_eq!(out.matches(prompts::CONTINUE_PROMPT).count(), 2);
    assert!(out.contains("The README says Hello."));
    assert!(out.trim_end().ends_with(prompts::GOODBYE));
}

#[tokio::test]
async fn test_end_of_input_ends_session_quietly() {
    let dir = TempDir::new().unwrap();
    let mut graph = graph(&dir, ConversationState::new("octocat/Hello-World"));
    let mut out = Vec::new();

    let state = drive(&mut graph, Cursor::new(""), &mut out).await.unwrap();

    assert!(!state.finished);
    assert!(state.index_ready);
    assert!(!String::from_utf8(out).unwrap().contains(prompts::GOODBYE));
}

#[tokio::test]
async fn test_error_is_printed_once() {
    let dir = TempDir::new().unwrap();
    let mut graph = graph(&dir, ConversationState::new("??"));
    let mut out = Vec::new();

    drive(&mut graph, Cursor::new("ignored\n"), &mut out).await.unwrap();
    let out = String::from_utf8(out).unwrap();

    assert_eq!(out.matches("Sorry, I encountered an error").count(), 1);
    assert!(!out.contains(prompts::QUESTION_PROMPT));
}
