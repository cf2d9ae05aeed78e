//! Display implementations for error types

use super::types::Error;
use std::fmt;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::CleanupTimeout { kind, timeout } => {
                write!(
                    f,
                    "{kind} cleanup timed out after {}ms",
                    timeout.as_millis()
                )
            }
            // The teardown's own message, untouched
            Error::CleanupFailed { source, .. } => write!(f, "{source}"),
            Error::CleanupPanicked {
                kind,
                description,
                message,
            } => {
                write!(f, "{kind} cleanup '{description}' panicked: {message}")
            }
            Error::Configuration { message } => {
                write!(f, "configuration error: {message}")
            }
            Error::FileSystem {
                path,
                operation,
                source,
            } => {
                write!(
                    f,
                    "file system {} operation failed for '{}': {}",
                    operation,
                    path.display(),
                    source
                )
            }
        }
    }
}
