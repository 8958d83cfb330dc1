use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, e.g. `QUILL_LOG=ql_runtime=debug`.
pub const LOG_ENV: &str = "QUILL_LOG";

/// Installs the stderr log subscriber. Stdout stays reserved for the
/// line protocol. Calling it twice is harmless.
pub fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}
