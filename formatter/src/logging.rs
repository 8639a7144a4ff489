//! Diagnostic tracing to stderr.
//!
//! Run results go to stdout and the audit artifact; this module only covers
//! developer-facing logs, which are unaffected by `--audit`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber.
///
/// Reads `RUST_LOG`. Without it the level is `warn`, or `debug` when
/// `verbose` is set. Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=docx_formatter=debug format-docx run report.docx --rules rules.yaml
/// ```
pub fn init(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
