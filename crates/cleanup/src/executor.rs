//! Running a single obligation under a timeout

use crate::exit::in_teardown;
use crate::obligation::{CleanupFn, Obligation, Resource, Teardown};
use crate::registry::CleanupRegistry;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use testkit_core::{CleanupOptions, Error, Result};
use tokio_util::sync::CancellationToken;

impl CleanupRegistry {
    /// Run one function obligation and stop tracking it
    ///
    /// The obligation is unregistered before its teardown starts, so it runs
    /// at most once even when a batch drain or another execution races with
    /// this call. Returns `Ok(false)` without running anything when the
    /// obligation is not tracked, and `Ok(true)` once it ran successfully.
    /// Failures are returned as-is and timeouts as [`Error::CleanupTimeout`].
    ///
    /// Dropping the returned future after the teardown has started leaves the
    /// obligation unregistered; asynchronous teardown keeps running on its own
    /// task.
    pub async fn execute_cleanup(
        &self,
        cleanup: &CleanupFn,
        options: CleanupOptions,
    ) -> Result<bool> {
        let Some(obligation) = self.take(&Obligation::Function(cleanup.clone())) else {
            tracing::debug!(
                description = cleanup.description(),
                "cleanup not registered, skipping"
            );
            return Ok(false);
        };
        self.execute(obligation, options).await
    }

    /// Run one resource obligation and stop tracking it
    ///
    /// Same contract as [`CleanupRegistry::execute_cleanup`].
    pub async fn execute_database_cleanup<T: Resource + ?Sized>(
        &self,
        handle: &Arc<T>,
        options: CleanupOptions,
    ) -> Result<bool> {
        let Some(obligation) = self.take_resource(handle) else {
            tracing::debug!("database cleanup not registered, skipping");
            return Ok(false);
        };
        self.execute(obligation, options).await
    }

    async fn execute(&self, obligation: Obligation, options: CleanupOptions) -> Result<bool> {
        let timeout = self.config().resolve_timeout(&options);
        run_obligation(&obligation, timeout).await.map(|()| true)
    }
}

/// Invoke an obligation's teardown, racing asynchronous work against `timeout`
///
/// Synchronous teardowns run to completion and never time out. Asynchronous
/// ones run on their own task; when the timer wins, the task is detached
/// rather than aborted and the obligation's cancellation token is triggered.
pub(crate) async fn run_obligation(obligation: &Obligation, timeout: Duration) -> Result<()> {
    let kind = obligation.kind();
    let cancel = CancellationToken::new();

    let teardown = match std::panic::catch_unwind(AssertUnwindSafe(|| {
        in_teardown(|| obligation.invoke(cancel.clone()))
    })) {
        Ok(teardown) => teardown,
        Err(payload) => {
            return Err(Error::cleanup_panicked(
                kind,
                obligation.description(),
                &*payload,
            ))
        }
    };

    match teardown {
        Teardown::Done(result) => {
            result.map_err(|e| Error::cleanup_failed(kind, obligation.description(), e))
        }
        Teardown::Pending(mut future) => {
            let task = tokio::spawn(futures::future::poll_fn(move |cx| {
                in_teardown(|| future.as_mut().poll(cx))
            }));
            match tokio::time::timeout(timeout, task).await {
                Ok(Ok(result)) => {
                    result.map_err(|e| Error::cleanup_failed(kind, obligation.description(), e))
                }
                Ok(Err(join_error)) if join_error.is_panic() => Err(Error::cleanup_panicked(
                    kind,
                    obligation.description(),
                    &*join_error.into_panic(),
                )),
                Ok(Err(join_error)) => Err(Error::cleanup_failed(
                    kind,
                    obligation.description(),
                    join_error,
                )),
                Err(_) => {
                    cancel.cancel();
                    Err(Error::cleanup_timeout(kind, timeout))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use testkit_core::{BoxError, ObligationKind};

    #[derive(Debug, thiserror::Error)]
    #[error("connection reset")]
    struct ConnectionReset;

    struct SlowPool {
        delay: Duration,
        closed: Arc<AtomicUsize>,
    }

    impl Resource for SlowPool {
        fn cleanup(&self) -> Teardown {
            let delay = self.delay;
            let closed = self.closed.clone();
            Teardown::pending(async move {
                tokio::time::sleep(delay).await;
                closed.fetch_add(1, Ordering::SeqCst);
                Ok::<(), BoxError>(())
            })
        }
    }

    fn counter() -> (Arc<AtomicUsize>, CleanupFn) {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let f = CleanupFn::from_fn(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        (calls, f)
    }

    #[tokio::test]
    async fn test_execute_runs_and_removes() {
        let registry = CleanupRegistry::new();
        let (calls, f) = counter();
        registry.register_cleanup(&f);

        assert!(registry.execute_cleanup(&f, CleanupOptions::new()).await.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.count(), 0);
    }

    #[tokio::test]
    async fn test_execute_unregistered_is_noop() {
        let registry = CleanupRegistry::new();
        let (calls, f) = counter();

        assert!(!registry.execute_cleanup(&f, CleanupOptions::new()).await.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        // Second execution after a successful one is also a no-op
        registry.register_cleanup(&f);
        registry.execute_cleanup(&f, CleanupOptions::new()).await.unwrap();
        assert!(!registry.execute_cleanup(&f, CleanupOptions::new()).await.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_execute_propagates_original_error_and_removes() {
        let registry = CleanupRegistry::new();
        let f = CleanupFn::new(|| Err::<(), _>(ConnectionReset));
        registry.register_cleanup(&f);

        let err = registry
            .execute_cleanup(&f, CleanupOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "connection reset");
        assert!(err
            .obligation_source()
            .and_then(|e| e.downcast_ref::<ConnectionReset>())
            .is_some());
        assert_eq!(registry.count(), 0);
    }

    #[tokio::test]
    async fn test_async_rejection_propagates() {
        let registry = CleanupRegistry::new();
        let f = CleanupFn::from_async(|| async { Err::<(), _>(ConnectionReset) });
        registry.register_cleanup(&f);

        let err = registry
            .execute_cleanup(&f, CleanupOptions::new())
            .await
            .unwrap_err();
        assert!(!err.is_timeout());
        assert_eq!(err.to_string(), "connection reset");
        assert_eq!(registry.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_carries_configured_value() {
        let registry = CleanupRegistry::new();
        let f = CleanupFn::from_async(|| async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok::<(), BoxError>(())
        });
        registry.register_cleanup(&f);

        let err = registry
            .execute_cleanup(&f, CleanupOptions::with_timeout_ms(100))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(err.timeout_ms(), Some(100));
        assert_eq!(err.obligation_kind(), Some(ObligationKind::Function));
        assert!(err.to_string().contains("100ms"));
        assert!(err.to_string().contains("function"));
        assert_eq!(registry.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_database_timeout_names_database() {
        let registry = CleanupRegistry::new();
        let closed = Arc::new(AtomicUsize::new(0));
        let pool = Arc::new(SlowPool {
            delay: Duration::from_millis(300),
            closed: closed.clone(),
        });
        registry.register_database_cleanup(&pool);

        let err = registry
            .execute_database_cleanup(&pool, CleanupOptions::with_timeout_ms(100))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "database cleanup timed out after 100ms");
        assert_eq!(registry.count(), 0);

        // The abandoned teardown is not cancelled and still finishes
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_cancels_cooperative_cleanup() {
        let registry = CleanupRegistry::new();
        let observed = Arc::new(AtomicUsize::new(0));
        let seen = observed.clone();
        let f = CleanupFn::cancellable(move |token| {
            let seen = seen.clone();
            async move {
                token.cancelled().await;
                seen.fetch_add(1, Ordering::SeqCst);
                Ok::<(), BoxError>(())
            }
        });
        registry.register_cleanup(&f);

        let err = registry
            .execute_cleanup(&f, CleanupOptions::with_timeout_ms(20))
            .await
            .unwrap_err();
        assert!(err.is_timeout());

        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(observed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_cleanup_never_times_out() {
        let registry = CleanupRegistry::new();
        let f = CleanupFn::from_fn(|| std::thread::sleep(Duration::from_millis(30)));
        registry.register_cleanup(&f);

        assert!(registry
            .execute_cleanup(&f, CleanupOptions::with_timeout_ms(1))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_panicking_cleanup_is_reported_and_removed() {
        let registry = CleanupRegistry::new();
        let f = CleanupFn::from_fn(|| panic!("teardown exploded")).with_description("exploder");
        registry.register_cleanup(&f);

        let err = registry
            .execute_cleanup(&f, CleanupOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CleanupPanicked { .. }));
        assert!(err.to_string().contains("teardown exploded"));
        assert_eq!(registry.count(), 0);
    }

    #[tokio::test]
    async fn test_obligation_is_claimed_before_it_runs() {
        let registry = CleanupRegistry::new();
        let observed = Arc::new(AtomicUsize::new(usize::MAX));
        let slot: Arc<parking_lot::Mutex<Option<CleanupFn>>> = Arc::default();
        let inner_registry = registry.clone();
        let inner_slot = slot.clone();
        let seen = observed.clone();
        let f = CleanupFn::from_fn(move || {
            if let Some(me) = inner_slot.lock().as_ref() {
                let still_tracked = usize::from(inner_registry.contains_cleanup(me));
                seen.store(still_tracked, Ordering::SeqCst);
            }
        });
        *slot.lock() = Some(f.clone());
        registry.register_cleanup(&f);

        assert!(registry.execute_cleanup(&f, CleanupOptions::new()).await.unwrap());
        assert_eq!(observed.load(Ordering::SeqCst), 0);
        assert_eq!(registry.count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_executions_run_once() {
        let registry = CleanupRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let f = CleanupFn::from_async(move || {
            let c = c.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<(), BoxError>(())
            }
        });
        registry.register_cleanup(&f);

        let (a, b) = tokio::join!(
            registry.execute_cleanup(&f, CleanupOptions::new()),
            registry.execute_cleanup(&f, CleanupOptions::new()),
        );
        let mut ran = [a.unwrap(), b.unwrap()];
        ran.sort_unstable();
        assert_eq!(ran, [false, true]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dropped_execution_leaves_obligation_unregistered() {
        let registry = CleanupRegistry::new();
        let f = CleanupFn::from_async(|| async {
            std::future::pending::<()>().await;
            Ok::<(), BoxError>(())
        });
        registry.register_cleanup(&f);

        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            registry.execute_cleanup(&f, CleanupOptions::new()),
        )
        .await;
        assert!(abandoned.is_err());
        assert!(!registry.contains_cleanup(&f));
        assert!(!registry.execute_cleanup(&f, CleanupOptions::new()).await.unwrap());
    }
}
