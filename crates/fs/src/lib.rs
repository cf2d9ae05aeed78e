//! Temporary directory sandboxes for tests
//!
//! A [`TempSandbox`] is registered with a cleanup registry as a resource, so a
//! scope or suite drain removes it, and with the process exit hooks, so an
//! interrupted run does not leave it behind.

mod sandbox;

pub use sandbox::{with_temp_dir, with_temp_dir_in, SandboxOptions, TempSandbox};
