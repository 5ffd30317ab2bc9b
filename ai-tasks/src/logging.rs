//! Diagnostic tracing for the orchestrator.
//!
//! Tracing goes to stderr and is controlled by `RUST_LOG`. It is not the
//! record of a run: the markdown agent logs under the logs directory and the
//! per-step commits are (see `io::agent_log`).

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`, defaulting to `warn`. Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=ai_tasks=debug ai-tasks --dry-run
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
