//! Builder methods for creating errors with context

use super::types::{BoxError, Error};
use crate::types::ObligationKind;
use std::path::PathBuf;
use std::time::Duration;

impl Error {
    /// Create a cleanup timeout error
    #[must_use]
    pub fn cleanup_timeout(kind: ObligationKind, timeout: Duration) -> Self {
        Error::CleanupTimeout { kind, timeout }
    }

    /// Wrap the error a teardown action returned
    #[must_use]
    pub fn cleanup_failed(
        kind: ObligationKind,
        description: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Error::CleanupFailed {
            kind,
            description: description.into(),
            source: source.into(),
        }
    }

    /// Create an error for a teardown action that panicked
    ///
    /// The payload is rendered when it is a `&str` or `String`, as the
    /// standard panic hook does.
    #[must_use]
    pub fn cleanup_panicked(
        kind: ObligationKind,
        description: impl Into<String>,
        payload: &(dyn std::any::Any + Send),
    ) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "Box<dyn Any>".to_string()
        };
        Error::CleanupPanicked {
            kind,
            description: description.into(),
            message,
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
        }
    }

    /// Create a file system error with context
    #[must_use]
    pub fn file_system(
        path: impl Into<PathBuf>,
        operation: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Error::FileSystem {
            path: path.into(),
            operation: operation.into(),
            source,
        }
    }
}
