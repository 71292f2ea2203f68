use tracing::info;
use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber. Level is taken from
/// `RUST_LOG`, defaulting to `info` when unset or invalid.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_target(true)
        .with_thread_ids(false)
        .with_level(true)
        .with_env_filter(filter)
        .init();

    info!("logging initialized");
}
