//! Interactive session.
//!
//! The only place that blocks on input. [`drive`] pumps a
//! [`ConversationGraph`]: print what the assistant said, show the prompt of
//! the pending interrupt, read one line, resume. End of input ends the
//! session without a closing message.

use anyhow::{Context, Result};
use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::conversation::{ConversationGraph, ConversationState, RunOutcome, Services};
use crate::models::Role;
use crate::progress::ProgressMode;
use crate::provider::ProviderKind;

/// Run `graph` to completion against `input`/`out`. Returns the final state.
pub async fn drive<R: BufRead, W: Write>(
    graph: &mut ConversationGraph,
    mut input: R,
    mut out: W,
) -> Result<ConversationState> {
    let mut shown = graph.state().messages.len();
    let mut outcome = graph.run().await;

    loop {
        shown = print_new_messages(graph.state(), shown, &mut out)?;
        let interrupt = match outcome {
            RunOutcome::Finished => break,
            RunOutcome::NeedsInput(interrupt) => interrupt,
        };

        write!(out, "\n{}\n> ", interrupt.prompt())?;
        out.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            tracing::info!("input closed, ending session");
            writeln!(out)?;
            break;
        }
        outcome = graph.resume(line.trim_end_matches(['\r', '\n'])).await?;
    }

    Ok(graph.state().clone())
}

fn print_new_messages<W: Write>(state: &ConversationState, from: usize, out: &mut W) -> Result<usize> {
    for message in state.messages.iter().skip(from) {
        if message.role == Role::Assistant {
            writeln!(out, "\n{}", message.content)?;
        }
    }
    Ok(state.messages.len())
}

/// `gitsurfer chat`.
pub async fn run_chat(
    config: Config,
    locator: &str,
    question: Option<String>,
    provider: Option<ProviderKind>,
    save_state: Option<&Path>,
) -> Result<()> {
    let config = Arc::new(config);
    let services =
        Services::from_config(&config)?.with_progress(ProgressMode::default_for_tty().reporter());

    let mut state = ConversationState::new(locator);
    if let Some(q) = question {
        state = state.with_question(q);
    }
    let mut graph = ConversationGraph::new(Arc::clone(&config), services, state);
    if let Some(kind) = provider {
        graph = graph.with_llm_provider(kind);
    }

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let final_state = drive(&mut graph, stdin.lock(), stdout.lock()).await?;

    if let Some(path) = save_state {
        let json = serde_json::to_string_pretty(&final_state)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write state to {}", path.display()))?;
        tracing::info!(path = %path.display(), "saved conversation state");
    }
    Ok(())
}
