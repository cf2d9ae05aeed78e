//! Shared value types

use serde::{Deserialize, Serialize};
use std::fmt;

/// The two shapes a cleanup obligation can take
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObligationKind {
    /// A plain teardown function
    Function,
    /// A resource-like handle exposing its own cleanup (database connections and friends)
    Database,
}

impl ObligationKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ObligationKind::Function => "function",
            ObligationKind::Database => "database",
        }
    }
}

impl fmt::Display for ObligationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_display() {
        assert_eq!(ObligationKind::Function.to_string(), "function");
        assert_eq!(ObligationKind::Database.to_string(), "database");
    }

    #[test]
    fn test_kind_serializes_lowercase() {
        let json = serde_json::to_string(&ObligationKind::Database).unwrap();
        assert_eq!(json, "\"database\"");
    }
}
