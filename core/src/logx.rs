use tracing_subscriber::{fmt, EnvFilter};

/// Initialize `tracing` once for the stash tools. `RUST_LOG` wins when set;
/// otherwise `default_level` applies. Output goes to stderr so archive
/// listings on stdout stay machine-readable.
pub fn init(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
