use tracing_subscriber::EnvFilter;

/// Install the global subscriber, filtered by `FOLIO_LOG`, then `RUST_LOG`,
/// then `info`. Logs go to stderr so stdout stays clean for page paths.
pub fn init() {
    tracing_subscriber::fmt().with_env_filter(env_filter()).with_writer(std::io::stderr).init();
}

pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env("FOLIO_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
