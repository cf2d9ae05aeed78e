/// Constants used throughout the testkit crates
use std::time::Duration;

/// Timeout applied to a cleanup obligation when no explicit timeout is given
pub const DEFAULT_CLEANUP_TIMEOUT: Duration = Duration::from_millis(5000);

// Environment variable names
pub const TESTKIT_CLEANUP_TIMEOUT_VAR: &str = "TESTKIT_CLEANUP_TIMEOUT_MS";
pub const TESTKIT_LOG_VAR: &str = "TESTKIT_LOG";
pub const TESTKIT_TMPDIR_VAR: &str = "TESTKIT_TMPDIR";

// Temp sandbox naming
pub const DEFAULT_SANDBOX_PREFIX: &str = "testkit-";

/// Log filter used when neither `TESTKIT_LOG` nor `RUST_LOG` is set
pub const DEFAULT_LOG_FILTER: &str = "warn";
