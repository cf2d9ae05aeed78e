//! The process-wide default registry and free-function shortcuts to it

use crate::drain::CleanupReport;
use crate::obligation::{CleanupFn, Resource};
use crate::registry::{CleanupCount, CleanupRegistry};
use crate::scope::CleanupScope;
use once_cell::sync::Lazy;
use std::future::Future;
use std::sync::Arc;
use testkit_core::{CleanupOptions, Result};

/// Default registry, configured from the environment on first use
static GLOBAL_REGISTRY: Lazy<CleanupRegistry> = Lazy::new(CleanupRegistry::from_env);

/// The process-wide default registry
///
/// Prefer passing a [`CleanupRegistry`] explicitly in new code; this exists
/// for suite-level teardown and helpers that have nowhere to receive one.
pub fn global() -> &'static CleanupRegistry {
    &GLOBAL_REGISTRY
}

pub fn register_cleanup(cleanup: &CleanupFn) -> bool {
    global().register_cleanup(cleanup)
}

pub fn register_database_cleanup<T: Resource>(handle: &Arc<T>) -> bool {
    global().register_database_cleanup(handle)
}

pub fn unregister_cleanup(cleanup: &CleanupFn) -> bool {
    global().unregister_cleanup(cleanup)
}

pub fn unregister_database_cleanup<T: Resource + ?Sized>(handle: &Arc<T>) -> bool {
    global().unregister_database_cleanup(handle)
}

pub async fn execute_cleanup(cleanup: &CleanupFn, options: CleanupOptions) -> Result<bool> {
    global().execute_cleanup(cleanup, options).await
}

pub async fn execute_database_cleanup<T: Resource + ?Sized>(
    handle: &Arc<T>,
    options: CleanupOptions,
) -> Result<bool> {
    global().execute_database_cleanup(handle, options).await
}

/// Drain the default registry; call this from suite teardown
pub async fn cleanup_all(options: CleanupOptions) -> CleanupReport {
    global().cleanup_all(options).await
}

pub fn cleanup_count() -> usize {
    global().count()
}

pub fn detailed_cleanup_count() -> CleanupCount {
    global().count_detailed()
}

pub async fn with_cleanup_scope<F, Fut, T>(f: F) -> T
where
    F: FnOnce(CleanupScope) -> Fut,
    Fut: Future<Output = T>,
{
    global().with_cleanup_scope(f).await
}
