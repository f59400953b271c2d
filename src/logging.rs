use tracing_subscriber::EnvFilter;

/// Installs the global subscriber: env-filtered fmt output, `info` when
/// `RUST_LOG` is unset. Safe to call more than once.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
