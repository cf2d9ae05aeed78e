//! Core error type definitions

use crate::types::ObligationKind;
use std::path::PathBuf;
use std::time::Duration;

/// Result type alias for testkit operations
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error returned by teardown actions
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Core error type for testkit operations using thiserror
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A cleanup obligation did not finish within its timeout
    CleanupTimeout {
        kind: ObligationKind,
        timeout: Duration,
    },

    /// A cleanup obligation's own teardown returned an error
    CleanupFailed {
        kind: ObligationKind,
        description: String,
        #[source]
        source: BoxError,
    },

    /// A cleanup obligation panicked while tearing down
    CleanupPanicked {
        kind: ObligationKind,
        description: String,
        message: String,
    },

    /// Configuration errors
    Configuration { message: String },

    /// File system operations
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Configured timeout in milliseconds, for timeout errors
    #[must_use]
    pub fn timeout_ms(&self) -> Option<u64> {
        match self {
            Error::CleanupTimeout { timeout, .. } => {
                Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX))
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::CleanupTimeout { .. })
    }

    /// The obligation kind this error was raised for, if any
    #[must_use]
    pub fn obligation_kind(&self) -> Option<ObligationKind> {
        match self {
            Error::CleanupTimeout { kind, .. }
            | Error::CleanupFailed { kind, .. }
            | Error::CleanupPanicked { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// The error the teardown action itself returned
    ///
    /// Use this to downcast back to the concrete error type a cleanup raised.
    #[must_use]
    pub fn obligation_source(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Error::CleanupFailed { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }

    /// Consume the error, returning the teardown action's own error if that is what this is
    pub fn into_obligation_source(self) -> std::result::Result<BoxError, Self> {
        match self {
            Error::CleanupFailed { source, .. } => Ok(source),
            other => Err(other),
        }
    }
}
