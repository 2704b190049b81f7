use tracing_subscriber::EnvFilter;

/// Install a stderr subscriber filtered by `RUST_LOG`, `warn` when unset.
///
/// Calling this more than once keeps the first subscriber.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
