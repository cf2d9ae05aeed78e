//! Draining every pending obligation in one batch

use crate::executor::run_obligation;
use crate::obligation::Obligation;
use crate::registry::CleanupRegistry;
use futures::future::join_all;
use std::fmt;
use std::time::Duration;
use testkit_core::{CleanupOptions, Error, ObligationKind};

/// One obligation that failed during a batch drain
#[derive(Debug)]
pub struct CleanupFailure {
    pub kind: ObligationKind,
    pub description: String,
    pub error: Error,
}

/// Outcome of a batch drain
#[derive(Debug, Default)]
pub struct CleanupReport {
    pub succeeded: usize,
    pub failures: Vec<CleanupFailure>,
}

impl CleanupReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    /// Number of obligations attempted
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.succeeded + self.failures.len()
    }

    /// Whether any failure was a timeout
    #[must_use]
    pub fn has_timeouts(&self) -> bool {
        self.failures.iter().any(|f| f.error.is_timeout())
    }
}

impl fmt::Display for CleanupReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} cleanup(s) succeeded, {} failed",
            self.succeeded,
            self.failures.len()
        )
    }
}

impl CleanupRegistry {
    /// Run every pending obligation once and leave them all unregistered
    ///
    /// Obligations are claimed up front and run concurrently, each under the
    /// same timeout. Failures and timeouts are logged and collected in the
    /// returned report; this never fails. Obligations registered while the
    /// drain is running are not part of the claim and stay pending. A drain
    /// racing with this one only gets the obligations this one did not claim.
    pub async fn cleanup_all(&self, options: CleanupOptions) -> CleanupReport {
        let snapshot = self.snapshot();
        let timeout = self.config().resolve_timeout(&options);
        self.drain(snapshot, timeout).await
    }

    /// Claim whichever of `obligations` are still registered and run them
    pub(crate) async fn drain(
        &self,
        obligations: Vec<Obligation>,
        timeout: Duration,
    ) -> CleanupReport {
        let obligations: Vec<Obligation> = obligations
            .iter()
            .filter_map(|obligation| self.take(obligation))
            .collect();
        if obligations.is_empty() {
            return CleanupReport::default();
        }
        tracing::debug!(count = obligations.len(), ?timeout, "draining cleanups");

        let outcomes = join_all(obligations.into_iter().map(|obligation| async move {
            let outcome = run_obligation(&obligation, timeout).await;
            (obligation, outcome)
        }))
        .await;

        let mut report = CleanupReport::default();
        for (obligation, outcome) in outcomes {
            match outcome {
                Ok(()) => report.succeeded += 1,
                Err(error) => {
                    let description = obligation.description();
                    tracing::warn!(
                        kind = %obligation.kind(),
                        description = %description,
                        "Cleanup failed: {error}"
                    );
                    report.failures.push(CleanupFailure {
                        kind: obligation.kind(),
                        description,
                        error,
                    });
                }
            }
        }

        if !report.is_clean() {
            tracing::warn!(
                "Cleanup completed with {} error(s) out of {} obligation(s)",
                report.failure_count(),
                report.attempted()
            );
        }

        report
    }
}
