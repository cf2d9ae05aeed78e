//! Core domain types, errors, and constants for `testkit`.
//!
//! ## Key Components
//!
//! - **`errors`**: the `Error` enum and `Result` alias shared by every testkit
//!   crate, including the cleanup timeout and obligation failure kinds.
//! - **`types`**: small shared value types such as [`ObligationKind`].
//! - **`config`**: cleanup configuration resolved from defaults and the
//!   environment.
//! - **`logging`**: `tracing-subscriber` initialization.
//! - **`constants`**: environment variable names and defaults.

pub mod config;
pub mod constants;
pub mod errors;
pub mod logging;
pub mod types;

pub use self::{
    config::{CleanupConfig, CleanupOptions},
    constants::*,
    errors::{BoxError, Error, Result},
    types::ObligationKind,
};
