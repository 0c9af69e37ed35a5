use tracing_subscriber::{fmt, EnvFilter};

/// Initialize structured logging with environment filter.
/// Set HELIO_LOG=debug (or trace, info, warn, error) for verbosity control.
///
/// Safe to call more than once; subsequent calls are no-ops so tests and
/// embedding runtimes can both bootstrap logging without coordination.
pub fn init_logging() {
    let filter = EnvFilter::try_from_env("HELIO_LOG")
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();
}
