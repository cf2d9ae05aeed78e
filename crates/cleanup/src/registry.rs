//! Registry of pending cleanup obligations

use crate::obligation::{CleanupFn, Obligation, ObligationKey, Resource};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use testkit_core::CleanupConfig;

/// Pending obligations split by kind
#[derive(Default)]
struct Entries {
    functions: IndexMap<ObligationKey, CleanupFn>,
    resources: IndexMap<ObligationKey, Arc<dyn Resource>>,
}

struct RegistryInner {
    entries: Mutex<Entries>,
    config: CleanupConfig,
}

/// Tracks cleanup obligations until they are executed or unregistered
///
/// Cloning a registry yields another handle to the same set of obligations.
/// Use [`crate::global`] for the process-wide default instance, or build a
/// fresh one per test.
#[derive(Clone)]
pub struct CleanupRegistry {
    inner: Arc<RegistryInner>,
}

/// Snapshot of how many obligations are pending
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupCount {
    pub functions: usize,
    pub resources: usize,
    pub total: usize,
}

impl CleanupRegistry {
    /// Create an empty registry with the default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(CleanupConfig::default())
    }

    /// Create an empty registry configured from the environment
    #[must_use]
    pub fn from_env() -> Self {
        Self::with_config(CleanupConfig::from_env())
    }

    #[must_use]
    pub fn with_config(config: CleanupConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                entries: Mutex::new(Entries::default()),
                config,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &CleanupConfig {
        &self.inner.config
    }

    /// Track a function obligation
    ///
    /// Returns `false` when this exact obligation is already tracked.
    pub fn register_cleanup(&self, cleanup: &CleanupFn) -> bool {
        let added = self.insert(Obligation::Function(cleanup.clone()));
        if added {
            tracing::debug!(description = cleanup.description(), "registered cleanup");
        }
        added
    }

    /// Track a resource obligation
    ///
    /// Returns `false` when this exact handle is already tracked.
    pub fn register_database_cleanup<T: Resource>(&self, handle: &Arc<T>) -> bool {
        let erased: Arc<dyn Resource> = handle.clone();
        let added = self.insert(Obligation::Resource(erased));
        if added {
            tracing::debug!(resource = %handle.describe(), "registered database cleanup");
        }
        added
    }

    /// Stop tracking a function obligation without running it
    ///
    /// Returns whether it was tracked.
    pub fn unregister_cleanup(&self, cleanup: &CleanupFn) -> bool {
        self.inner
            .entries
            .lock()
            .functions
            .shift_remove(&cleanup.key())
            .is_some()
    }

    /// Stop tracking a resource obligation without running it
    ///
    /// Returns whether it was tracked.
    pub fn unregister_database_cleanup<T: Resource + ?Sized>(&self, handle: &Arc<T>) -> bool {
        self.inner
            .entries
            .lock()
            .resources
            .shift_remove(&ObligationKey::of_resource(handle))
            .is_some()
    }

    #[must_use]
    pub fn contains_cleanup(&self, cleanup: &CleanupFn) -> bool {
        self.inner
            .entries
            .lock()
            .functions
            .contains_key(&cleanup.key())
    }

    #[must_use]
    pub fn contains_database_cleanup<T: Resource + ?Sized>(&self, handle: &Arc<T>) -> bool {
        self.inner
            .entries
            .lock()
            .resources
            .contains_key(&ObligationKey::of_resource(handle))
    }

    /// Total number of pending obligations
    #[must_use]
    pub fn count(&self) -> usize {
        self.count_detailed().total
    }

    #[must_use]
    pub fn count_detailed(&self) -> CleanupCount {
        let entries = self.inner.entries.lock();
        let functions = entries.functions.len();
        let resources = entries.resources.len();
        CleanupCount {
            functions,
            resources,
            total: functions + resources,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub(crate) fn insert(&self, obligation: Obligation) -> bool {
        let mut entries = self.inner.entries.lock();
        let key = obligation.key();
        match obligation {
            Obligation::Function(f) => {
                if entries.functions.contains_key(&key) {
                    return false;
                }
                entries.functions.insert(key, f);
            }
            Obligation::Resource(handle) => {
                if entries.resources.contains_key(&key) {
                    return false;
                }
                entries.resources.insert(key, handle);
            }
        }
        true
    }

    /// The tracked obligation with this identity, if still present
    pub(crate) fn lookup(&self, obligation: &Obligation) -> Option<Obligation> {
        let entries = self.inner.entries.lock();
        let key = obligation.key();
        match obligation {
            Obligation::Function(_) => entries
                .functions
                .get(&key)
                .cloned()
                .map(Obligation::Function),
            Obligation::Resource(_) => entries
                .resources
                .get(&key)
                .cloned()
                .map(Obligation::Resource),
        }
    }

    /// Remove and return the tracked obligation with this identity
    ///
    /// Exactly one caller can claim a given registration.
    pub(crate) fn take(&self, obligation: &Obligation) -> Option<Obligation> {
        let mut entries = self.inner.entries.lock();
        let key = obligation.key();
        match obligation {
            Obligation::Function(_) => entries
                .functions
                .shift_remove(&key)
                .map(Obligation::Function),
            Obligation::Resource(_) => entries
                .resources
                .shift_remove(&key)
                .map(Obligation::Resource),
        }
    }

    pub(crate) fn take_resource<T: Resource + ?Sized>(
        &self,
        handle: &Arc<T>,
    ) -> Option<Obligation> {
        self.inner
            .entries
            .lock()
            .resources
            .shift_remove(&ObligationKey::of_resource(handle))
            .map(Obligation::Resource)
    }

    /// Every pending obligation, resources first, in registration order
    pub(crate) fn snapshot(&self) -> Vec<Obligation> {
        let entries = self.inner.entries.lock();
        entries
            .resources
            .values()
            .cloned()
            .map(Obligation::Resource)
            .chain(entries.functions.values().cloned().map(Obligation::Function))
            .collect()
    }
}

impl Default for CleanupRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CleanupRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupRegistry")
            .field("pending", &self.count_detailed())
            .field("config", self.config())
            .finish()
    }
}
