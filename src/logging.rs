//! Diagnostic logging.
//!
//! Diagnostics go to stderr through `tracing`, filtered by `RUST_LOG`. Stdout
//! is reserved for the conversation itself (answers and prompts), so nothing
//! here ever writes to it.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. `RUST_LOG` wins when set; otherwise
/// `warn`, or `gitsurfer=info` with `verbose`.
///
/// ```bash
/// RUST_LOG=gitsurfer=trace gitsurfer chat octocat/Hello-World
/// ```
pub fn init(verbose: bool) {
    let fallback = if verbose { "warn,gitsurfer=info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    // try_init: a second call (e.g. from tests) is a no-op.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
