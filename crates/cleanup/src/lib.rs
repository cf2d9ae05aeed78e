//! Cleanup registry for test resources
//!
//! Tests register teardown work as it is created, either as a [`CleanupFn`]
//! or as a handle implementing [`Resource`]. The registry then runs that work
//! in one of three ways:
//!
//! - one obligation at a time with [`CleanupRegistry::execute_cleanup`], which
//!   returns the obligation's own error or a timeout error;
//! - all at once with [`CleanupRegistry::cleanup_all`], which never fails and
//!   reports what went wrong instead;
//! - per scope with [`CleanupRegistry::with_cleanup_scope`], which drains only
//!   what the scope registered.
//!
//! Every path unregisters the obligation before its teardown starts, so a
//! teardown runs at most once and a failed one is never retried.
//!
//! ```no_run
//! use testkit_cleanup::{CleanupFn, CleanupRegistry};
//! use testkit_core::CleanupOptions;
//!
//! # async fn demo() {
//! let registry = CleanupRegistry::new();
//! let dir = std::env::temp_dir().join("scratch");
//!
//! let value = registry
//!     .with_cleanup_scope(|scope| async move {
//!         std::fs::create_dir_all(&dir).unwrap();
//!         let d = dir.clone();
//!         scope.register_cleanup(&CleanupFn::new(move || std::fs::remove_dir_all(&d)));
//!         42
//!     })
//!     .await;
//! assert_eq!(value, 42);
//!
//! let report = registry.cleanup_all(CleanupOptions::new()).await;
//! assert!(report.is_clean());
//! # }
//! ```

pub mod drain;
mod executor;
pub mod exit;
pub mod global;
pub mod obligation;
pub mod registry;
pub mod scope;

pub use drain::{CleanupFailure, CleanupReport};
pub use exit::{exit_hooks, install_exit_handler, ExitHookId, ExitHooks};
pub use global::*;
pub use obligation::{CleanupFn, Resource, Teardown, TeardownResult};
pub use registry::{CleanupCount, CleanupRegistry};
pub use scope::CleanupScope;
pub use tokio_util::sync::CancellationToken;
