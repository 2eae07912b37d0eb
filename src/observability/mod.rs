//! Observability: structured logging and the pipeline event export.

mod event_bus;

pub use event_bus::{EventBus, global_event_bus};

use tracing_subscriber::EnvFilter;

/// Logging initialization options.
#[derive(Debug, Clone, Copy, Default)]
pub struct InitOptions {
    /// Whether verbose output was requested via CLI.
    pub verbose: bool,
    /// Whether to emit JSON log lines instead of human-readable ones.
    pub json: bool,
}

/// Initializes the tracing subscriber once for the process.
///
/// Respects `RUST_LOG` when set; otherwise defaults to `info`, or `debug`
/// with `--verbose`. Safe to call more than once (later calls are no-ops).
pub fn init_logging(options: InitOptions) {
    let default_directive = if options.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = if options.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if result.is_err() {
        tracing::debug!("logging already initialized");
    }
}
