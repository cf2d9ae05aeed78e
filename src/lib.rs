//! Test-support toolkit
//!
//! Re-exports the testkit crates behind one dependency:
//!
//! - [`testkit_core`]: errors, configuration, logging setup;
//! - [`testkit_cleanup`]: the cleanup registry, scopes and exit hooks;
//! - [`testkit_fs`]: temp-directory sandboxes driven by the registry.

pub use testkit_cleanup::{
    cleanup_all, cleanup_count, detailed_cleanup_count, execute_cleanup,
    execute_database_cleanup, exit_hooks, global, install_exit_handler, register_cleanup,
    register_database_cleanup, unregister_cleanup, unregister_database_cleanup,
    with_cleanup_scope, CancellationToken, CleanupCount, CleanupFailure, CleanupFn,
    CleanupRegistry, CleanupReport, CleanupScope, ExitHookId, ExitHooks, Resource, Teardown,
    TeardownResult,
};
pub use testkit_core::{
    logging, BoxError, CleanupConfig, CleanupOptions, Error, ObligationKind, Result,
    DEFAULT_CLEANUP_TIMEOUT,
};
pub use testkit_fs::{with_temp_dir, with_temp_dir_in, SandboxOptions, TempSandbox};
