//! # Harness Configuration
//!
//! Harness-level settings loaded from environment variables.

use std::time::Duration;

/// Harness-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    /// How long a service may take to get ready endpoints (seconds)
    pub readiness_timeout_secs: u64,
    /// First delay between readiness polls (milliseconds)
    pub poll_start_ms: u64,
    /// Maximum delay between readiness polls (milliseconds)
    pub poll_max_ms: u64,
    /// Field manager name used for server-side apply
    pub field_manager: String,
    /// Cluster DNS domain used when an echo config leaves it unset
    pub domain: String,
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    pub log_level: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            readiness_timeout_secs: DEFAULT_READINESS_TIMEOUT_SECS,
            poll_start_ms: DEFAULT_POLL_START_MS,
            poll_max_ms: DEFAULT_POLL_MAX_MS,
            field_manager: DEFAULT_FIELD_MANAGER.to_string(),
            domain: DEFAULT_DOMAIN.to_string(),
            log_level: "INFO".to_string(),
        }
    }
}

impl HarnessConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    ///
    /// `from_env` is a thin wrapper over this so tests can feed values
    /// without touching the process environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        use crate::constants::*;
        Self {
            readiness_timeout_secs: parse_or_default(
                lookup("ECHO_READINESS_TIMEOUT_SECS"),
                DEFAULT_READINESS_TIMEOUT_SECS,
            ),
            poll_start_ms: parse_or_default(lookup("ECHO_POLL_START_MS"), DEFAULT_POLL_START_MS),
            poll_max_ms: parse_or_default(lookup("ECHO_POLL_MAX_MS"), DEFAULT_POLL_MAX_MS),
            field_manager: lookup("ECHO_FIELD_MANAGER")
                .unwrap_or_else(|| DEFAULT_FIELD_MANAGER.to_string()),
            domain: lookup("ECHO_DOMAIN").unwrap_or_else(|| DEFAULT_DOMAIN.to_string()),
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "INFO".to_string()),
        }
    }

    /// Get readiness timeout duration
    #[must_use]
    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.readiness_timeout_secs)
    }

    /// Get first poll interval duration
    ///
    /// Never zero, so the readiness poll always backs off.
    #[must_use]
    pub fn poll_start(&self) -> Duration {
        Duration::from_millis(self.poll_start_ms.max(1))
    }

    /// Get maximum poll interval duration
    #[must_use]
    pub fn poll_max(&self) -> Duration {
        Duration::from_millis(self.poll_max_ms).max(self.poll_start())
    }
}

/// Parse a raw value or return default
fn parse_or_default<T: std::str::FromStr>(raw: Option<String>, default: T) -> T {
    raw.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_nothing_set() {
        let config = HarnessConfig::from_lookup(|_| None);
        assert_eq!(config, HarnessConfig::default());
        assert_eq!(config.readiness_timeout(), Duration::from_secs(300));
        assert_eq!(config.domain, "svc.cluster.local");
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = HarnessConfig::from_lookup(lookup_from(&[
            ("ECHO_READINESS_TIMEOUT_SECS", "30"),
            ("ECHO_POLL_START_MS", "100"),
            ("ECHO_POLL_MAX_MS", "800"),
            ("ECHO_FIELD_MANAGER", "it-suite"),
            ("ECHO_DOMAIN", "cluster.test"),
        ]));

        assert_eq!(config.readiness_timeout(), Duration::from_secs(30));
        assert_eq!(config.poll_start(), Duration::from_millis(100));
        assert_eq!(config.poll_max(), Duration::from_millis(800));
        assert_eq!(config.field_manager, "it-suite");
        assert_eq!(config.domain, "cluster.test");
    }

    #[test]
    fn test_unparseable_values_fall_back() {
        let config = HarnessConfig::from_lookup(lookup_from(&[
            ("ECHO_READINESS_TIMEOUT_SECS", "soon"),
            ("ECHO_POLL_START_MS", "-5"),
        ]));

        assert_eq!(config.readiness_timeout_secs, 300);
        assert_eq!(config.poll_start_ms, 500);
    }

    #[test]
    fn test_poll_max_never_below_start() {
        let config = HarnessConfig::from_lookup(lookup_from(&[
            ("ECHO_POLL_START_MS", "2000"),
            ("ECHO_POLL_MAX_MS", "100"),
        ]));

        assert_eq!(config.poll_max(), Duration::from_millis(2000));
    }

    #[test]
    fn test_zero_poll_start_is_clamped() {
        let config = HarnessConfig::from_lookup(lookup_from(&[
            ("ECHO_POLL_START_MS", "0"),
            ("ECHO_POLL_MAX_MS", "0"),
        ]));

        assert_eq!(config.poll_start(), Duration::from_millis(1));
        assert_eq!(config.poll_max(), Duration::from_millis(1));
    }
}
