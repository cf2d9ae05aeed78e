//! Error types for testkit operations

mod builders;
mod conversions;
mod display;
mod types;

pub use types::{BoxError, Error, Result};
