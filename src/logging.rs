// Tracing setup for hosting binaries and integration tests
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize logging to stderr.
///
/// The log level can be controlled via the `RUST_LOG` environment variable;
/// engine modules default to DEBUG, everything else to WARN. Safe to call
/// more than once; later calls are ignored.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("driftplay=debug,warn"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}
