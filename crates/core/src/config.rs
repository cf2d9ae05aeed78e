//! Cleanup configuration with precedence: explicit option, environment, default

use crate::constants::{DEFAULT_CLEANUP_TIMEOUT, TESTKIT_CLEANUP_TIMEOUT_VAR};
use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Registry-wide cleanup settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    /// Timeout applied to each obligation when a call does not override it
    #[serde(with = "duration_ms", rename = "default_timeout_ms")]
    pub default_timeout: Duration,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_CLEANUP_TIMEOUT,
        }
    }
}

impl CleanupConfig {
    /// Defaults overlaid with `TESTKIT_CLEANUP_TIMEOUT_MS` when it is set and valid
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(timeout_str) = std::env::var(TESTKIT_CLEANUP_TIMEOUT_VAR) {
            match parse_timeout_ms(&timeout_str) {
                Ok(timeout) => config.default_timeout = timeout,
                Err(e) => {
                    tracing::warn!("Ignoring {TESTKIT_CLEANUP_TIMEOUT_VAR}: {e}");
                }
            }
        }

        config
    }

    /// Parse a JSON document such as `{"default_timeout_ms": 250}`
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_timeout.is_zero() {
            return Err(Error::configuration(
                "default cleanup timeout must be greater than zero",
            ));
        }
        Ok(())
    }

    /// The timeout to use for a call given its options
    #[must_use]
    pub fn resolve_timeout(&self, options: &CleanupOptions) -> Duration {
        options.timeout.unwrap_or(self.default_timeout)
    }
}

/// Per-call overrides for executing or draining obligations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupOptions {
    pub timeout: Option<Duration>,
}

impl CleanupOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }

    #[must_use]
    pub fn with_timeout_ms(timeout_ms: u64) -> Self {
        Self::with_timeout(Duration::from_millis(timeout_ms))
    }
}

fn parse_timeout_ms(value: &str) -> Result<Duration> {
    let millis = value.trim().parse::<u64>().map_err(|e| {
        Error::configuration(format!("invalid timeout '{value}': {e}"))
    })?;
    if millis == 0 {
        return Err(Error::configuration("timeout must be greater than zero"));
    }
    Ok(Duration::from_millis(millis))
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_from_env_reads_timeout() {
        std::env::set_var(TESTKIT_CLEANUP_TIMEOUT_VAR, "250");
        let config = CleanupConfig::from_env();
        std::env::remove_var(TESTKIT_CLEANUP_TIMEOUT_VAR);

        assert_eq!(config.default_timeout, Duration::from_millis(250));
    }

    #[test]
    #[serial]
    fn test_from_env_ignores_garbage() {
        std::env::set_var(TESTKIT_CLEANUP_TIMEOUT_VAR, "soon");
        let config = CleanupConfig::from_env();
        std::env::set_var(TESTKIT_CLEANUP_TIMEOUT_VAR, "0");
        let zero = CleanupConfig::from_env();
        std::env::remove_var(TESTKIT_CLEANUP_TIMEOUT_VAR);

        assert_eq!(config, CleanupConfig::default());
        assert_eq!(zero, CleanupConfig::default());
    }

    #[test]
    fn test_explicit_option_wins() {
        let config = CleanupConfig::default();
        assert_eq!(
            config.resolve_timeout(&CleanupOptions::new()),
            DEFAULT_CLEANUP_TIMEOUT
        );
        assert_eq!(
            config.resolve_timeout(&CleanupOptions::with_timeout_ms(50)),
            Duration::from_millis(50)
        );
    }

    #[test]
    fn test_json_config() {
        let config = CleanupConfig::from_json_str(r#"{"default_timeout_ms": 1200}"#).unwrap();
        assert_eq!(config.default_timeout, Duration::from_millis(1200));

        let config = CleanupConfig::from_json_str("{}").unwrap();
        assert_eq!(config, CleanupConfig::default());

        assert!(CleanupConfig::from_json_str(r#"{"default_timeout_ms": 0}"#).is_err());
        assert!(CleanupConfig::from_json_str("not json").is_err());
    }
}
