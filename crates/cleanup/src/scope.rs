//! Scoped cleanup and resource factories

use crate::drain::CleanupReport;
use crate::obligation::{CleanupFn, Obligation, Resource};
use crate::registry::CleanupRegistry;
use futures::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use testkit_core::CleanupOptions;

/// Registration handle bound to one [`CleanupRegistry::with_cleanup_scope`] call
///
/// Obligations registered through a scope are tracked by the shared registry
/// as usual, and additionally remembered by the scope. When the scope ends it
/// drains only those, so an inner scope never tears down obligations that
/// belong to an enclosing scope or to the suite.
#[derive(Clone)]
pub struct CleanupScope {
    registry: CleanupRegistry,
    owned: Arc<Mutex<Vec<Obligation>>>,
}

impl CleanupScope {
    fn new(registry: CleanupRegistry) -> Self {
        Self {
            registry,
            owned: Arc::default(),
        }
    }

    /// The registry this scope registers into
    #[must_use]
    pub fn registry(&self) -> &CleanupRegistry {
        &self.registry
    }

    /// Register a function obligation owned by this scope
    ///
    /// An obligation that was already tracked stays with its current owner and
    /// `false` is returned.
    pub fn register_cleanup(&self, cleanup: &CleanupFn) -> bool {
        self.adopt(Obligation::Function(cleanup.clone()))
    }

    /// Register a resource obligation owned by this scope
    pub fn register_database_cleanup<T: Resource>(&self, handle: &Arc<T>) -> bool {
        let erased: Arc<dyn Resource> = handle.clone();
        self.adopt(Obligation::Resource(erased))
    }

    /// Register `resource` with this scope and hand it back
    pub fn manage<T: Resource>(&self, resource: T) -> Arc<T> {
        let handle = Arc::new(resource);
        self.register_database_cleanup(&handle);
        handle
    }

    /// Obligations owned by this scope that are still pending
    #[must_use]
    pub fn pending(&self) -> usize {
        self.owned
            .lock()
            .iter()
            .filter(|obligation| self.registry.lookup(obligation).is_some())
            .count()
    }

    /// Drain the obligations this scope owns that are still registered
    pub async fn drain(&self, options: CleanupOptions) -> CleanupReport {
        let owned = std::mem::take(&mut *self.owned.lock());
        let timeout = self.registry.config().resolve_timeout(&options);
        self.registry.drain(owned, timeout).await
    }

    fn adopt(&self, obligation: Obligation) -> bool {
        let added = self.registry.insert(obligation.clone());
        if added {
            tracing::debug!(
                kind = %obligation.kind(),
                description = %obligation.description(),
                "registered scoped cleanup"
            );
            self.owned.lock().push(obligation);
        }
        added
    }
}

impl CleanupRegistry {
    /// Run `f`, then drain everything it registered through its scope handle
    ///
    /// The result of `f` is returned unchanged, including `Err` values.
    /// Failures while draining are logged, never substituted for that result.
    /// If `f` panics, the scope is drained and the panic resumes.
    pub async fn with_cleanup_scope<F, Fut, T>(&self, f: F) -> T
    where
        F: FnOnce(CleanupScope) -> Fut,
        Fut: Future<Output = T>,
    {
        self.with_cleanup_scope_options(CleanupOptions::default(), f)
            .await
    }

    /// [`CleanupRegistry::with_cleanup_scope`] with a timeout override for the final drain
    pub async fn with_cleanup_scope_options<F, Fut, T>(&self, options: CleanupOptions, f: F) -> T
    where
        F: FnOnce(CleanupScope) -> Fut,
        Fut: Future<Output = T>,
    {
        let scope = CleanupScope::new(self.clone());
        let handle = scope.clone();
        let outcome = AssertUnwindSafe(async move { f(handle).await })
            .catch_unwind()
            .await;

        scope.drain(options).await;

        match outcome {
            Ok(value) => value,
            Err(payload) => std::panic::resume_unwind(payload),
        }
    }

    /// Register `resource` for the next batch drain and hand it back
    pub fn manage<T: Resource>(&self, resource: T) -> Arc<T> {
        let handle = Arc::new(resource);
        self.register_database_cleanup(&handle);
        handle
    }

    /// Build a resource with `factory` and register it for the next batch drain
    ///
    /// Nothing is registered when the factory fails.
    pub async fn create_resource<F, Fut, T, E>(&self, factory: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: Resource,
    {
        let resource = factory().await?;
        Ok(self.manage(resource))
    }
}
