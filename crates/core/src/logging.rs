//! Logging setup built on `tracing-subscriber`

use crate::constants::{DEFAULT_LOG_FILTER, TESTKIT_LOG_VAR};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the tracing system
///
/// The filter comes from `TESTKIT_LOG`, then `RUST_LOG`, then falls back to
/// `warn` so batch cleanup failures are always visible. Calling this more than
/// once is harmless; later calls report the existing subscriber as an error.
pub fn init() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .compact()
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true);

    tracing_subscriber::registry()
        .with(filter())
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}

/// Initialize logging for tests, routing output through the test harness capture
pub fn init_for_tests() {
    let _ = tracing_subscriber::registry()
        .with(filter())
        .with(fmt::layer().with_test_writer().compact())
        .try_init();
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_env(TESTKIT_LOG_VAR)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}
