use tracing_subscriber::EnvFilter;

/// Set to any value to turn on debug logging in release builds.
pub const DEBUG_ENV: &str = "SELECTION_ASSISTANT_DEBUG";

/// Whether debug logging was requested for this run.
pub fn debug_requested() -> bool {
    cfg!(debug_assertions) || std::env::var_os(DEBUG_ENV).is_some()
}

/// Initialise logging. `RUST_LOG` only overrides the level when debug logging
/// is on; otherwise the level is pinned to `info`. Calling this twice is a no-op.
pub fn init(debug: bool) {
    let level = if debug { "debug" } else { "info" };

    let filter = if debug {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    } else {
        EnvFilter::new(level)
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
