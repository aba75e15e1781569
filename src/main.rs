//! # GitSurfer CLI (`gitsurfer`)
//!
//! Chat with a GitHub repository from the terminal.
//!
//! ## Usage
//!
//! ```bash
//! gitsurfer --config ./config/gitsurfer.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `gitsurfer chat <repo>` | Fetch, index and answer questions interactively |
//! | `gitsurfer fetch <repo>` | Fetch the tree summary and files into the artifact directory |
//! | `gitsurfer index` | Build the vector index from the fetched artifacts |
//! | `gitsurfer search "<question>"` | Research a question against the existing index |
//! | `gitsurfer providers` | List providers and whether their API keys are set |
//! | `gitsurfer completions <shell>` | Print a shell completion script |
//!
//! ## Examples
//!
//! ```bash
//! # Interactive session on the default branch
//! gitsurfer chat octocat/Hello-World
//!
//! # A specific branch, with the first question supplied up front
//! gitsurfer chat https://github.com/rust-lang/cargo/tree/master --question "Where are lockfiles written?"
//!
//! # Re-index with OpenAI embeddings, then search
//! gitsurfer index --provider openai
//! gitsurfer search "error handling" --provider openai
//! ```

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use gitsurfer::provider::{list_providers, ProviderKind, Providers};
use gitsurfer::{config, fetch, index, logging, research, session};

/// GitSurfer: ask questions about any GitHub repository.
///
/// API keys are read from the environment (or a `.env` file). See
/// `config/gitsurfer.example.toml` for every setting.
#[derive(Parser)]
#[command(
    name = "gitsurfer",
    about = "GitSurfer: ask questions about any GitHub repository",
    version,
    long_about = "GitSurfer fetches a GitHub repository, indexes its files in a local vector store \
    and answers questions about the code by researching the index with a language model."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/gitsurfer.toml`. A missing file means defaults.
    #[arg(long, global = true, default_value = "./config/gitsurfer.toml")]
    config: PathBuf,

    /// Log progress from gitsurfer to stderr.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive session about a repository.
    ///
    /// Accepts `owner/repo`, `github.com/owner/repo` or a full URL, with an
    /// optional `/tree/<branch>`. End the session by answering `no` or
    /// closing stdin.
    Chat {
        /// Repository reference.
        locator: String,

        /// First question; skips the initial prompt.
        #[arg(long)]
        question: Option<String>,

        /// Language model provider (gemini, openai, anthropic, cohere).
        #[arg(long)]
        provider: Option<ProviderKind>,

        /// Write the final conversation state as JSON.
        #[arg(long)]
        save_state: Option<PathBuf>,
    },

    /// Fetch a repository into the artifact directory.
    Fetch {
        /// Repository reference.
        locator: String,
    },

    /// Build the vector index from fetched artifacts.
    Index {
        /// Embedding provider; defaults to `[embedding].provider`.
        #[arg(long, conflicts_with = "all")]
        provider: Option<ProviderKind>,

        /// Index with every embedding provider that has an API key.
        #[arg(long)]
        all: bool,
    },

    /// Research a question against the existing index.
    Search {
        question: String,

        /// Embedding provider whose index to search.
        #[arg(long)]
        provider: Option<ProviderKind>,
    },

    /// List providers, their capabilities and API key status.
    Providers,

    /// Print a shell completion script.
    Completions {
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    // Commands that don't require config
    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "gitsurfer", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Chat {
            locator,
            question,
            provider,
            save_state,
        } => {
            session::run_chat(cfg, &locator, question, provider, save_state.as_deref()).await?;
        }
        Commands::Fetch { locator } => {
            fetch::run_fetch(cfg, &locator).await?;
        }
        Commands::Index { provider, all } => {
            index::run_index(cfg, provider, all).await?;
        }
        Commands::Search { question, provider } => {
            research::run_search(cfg, &question, provider).await?;
        }
        Commands::Providers => {
            let providers = Providers::from_config(&cfg)?;
            list_providers(&cfg, &providers);
        }
        Commands::Completions { .. } => unreachable!(),
    }

    Ok(())
}
