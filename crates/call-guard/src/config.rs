//! Configuration for call-guard

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CallGuardError, Result};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CallGuardConfig {
    /// Persistent storage
    pub database: DatabaseConfig,

    /// Blocking decision engine
    pub decision: DecisionConfig,

    /// Call termination
    pub control: ControlConfig,

    /// Call lifecycle tracking
    pub tracker: TrackerConfig,

    /// Logging
    pub logging: LogSettings,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite connection URL
    pub url: String,

    /// Pool size; in-memory databases always use a single connection
    pub max_connections: u32,
}

/// Decision engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// Upper bound on a blocklist lookup before failing open (milliseconds)
    pub lookup_timeout_ms: u64,

    /// Minimum digits for trailing-digit matches; 0 means exact matches only
    pub suffix_match_digits: usize,
}

/// Call control configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Upper bound on each termination attempt (milliseconds)
    pub attempt_timeout_ms: u64,
}

/// Tracker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Unanswered rings shorter than this are recorded as missed (seconds)
    pub missed_call_threshold_secs: u64,

    /// Capacity of the tracker notification channel
    pub event_buffer: usize,

    /// Ended sessions remembered while their decision is still in flight
    pub unresolved_capacity: usize,
}

/// Logging settings as they appear in the configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
    pub json: bool,
    pub file_info: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://call_guard.db?mode=rwc".to_string(),
            max_connections: 4,
        }
    }
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            lookup_timeout_ms: 2000,
            suffix_match_digits: 7,
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            attempt_timeout_ms: 1500,
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            missed_call_threshold_secs: 5,
            event_buffer: 64,
            unresolved_capacity: 16,
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file_info: false,
        }
    }
}

impl DatabaseConfig {
    pub fn in_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }
}

impl DecisionConfig {
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }
}

impl ControlConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }
}

impl TrackerConfig {
    pub fn missed_call_threshold(&self) -> Duration {
        Duration::from_secs(self.missed_call_threshold_secs)
    }
}

impl CallGuardConfig {
    /// Parse a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            CallGuardError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Configuration backed by a private in-memory database
    pub fn in_memory() -> Self {
        Self {
            database: DatabaseConfig::in_memory(),
            ..Default::default()
        }
    }

    /// Apply `CALL_GUARD_*` overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("CALL_GUARD_DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(level) = lookup("CALL_GUARD_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(timeout) = lookup("CALL_GUARD_LOOKUP_TIMEOUT_MS") {
            self.decision.lookup_timeout_ms = timeout.parse().map_err(|_| {
                CallGuardError::config(format!(
                    "CALL_GUARD_LOOKUP_TIMEOUT_MS is not a number: {}",
                    timeout
                ))
            })?;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.url.trim().is_empty() {
            return Err(CallGuardError::config("database.url must not be empty"));
        }
        if self.database.max_connections == 0 {
            return Err(CallGuardError::config("database.max_connections must be at least 1"));
        }
        if self.decision.lookup_timeout_ms == 0 {
            return Err(CallGuardError::config("decision.lookup_timeout_ms must be positive"));
        }
        if self.control.attempt_timeout_ms == 0 {
            return Err(CallGuardError::config("control.attempt_timeout_ms must be positive"));
        }
        if self.tracker.missed_call_threshold_secs == 0 {
            return Err(CallGuardError::config(
                "tracker.missed_call_threshold_secs must be positive",
            ));
        }
        if self.tracker.event_buffer == 0 {
            return Err(CallGuardError::config("tracker.event_buffer must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = CallGuardConfig::default();
        assert_eq!(config.decision.lookup_timeout(), Duration::from_secs(2));
        assert_eq!(config.tracker.missed_call_threshold(), Duration::from_secs(5));
        assert_eq!(config.decision.suffix_match_digits, 7);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = CallGuardConfig::from_toml_str(
            r#"
            [database]
            url = "sqlite::memory:"

            [tracker]
            missed_call_threshold_secs = 8
            "#,
        )
        .unwrap();
        assert!(config.database.is_in_memory());
        assert_eq!(config.tracker.missed_call_threshold_secs, 8);
        assert_eq!(config.control.attempt_timeout_ms, 1500);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = CallGuardConfig::from_toml_str("[decision]\nlookup_timeout_ms = 0").unwrap_err();
        assert!(matches!(err, CallGuardError::Config(_)));

        let err = CallGuardConfig::from_toml_str("[database\n").unwrap_err();
        assert!(matches!(err, CallGuardError::Config(_)));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("CALL_GUARD_DATABASE_URL", "sqlite::memory:"),
            ("CALL_GUARD_LOOKUP_TIMEOUT_MS", "250"),
        ]
        .into_iter()
        .collect();

        let mut config = CallGuardConfig::default();
        config
            .apply_overrides_from(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.decision.lookup_timeout_ms, 250);

        let mut config = CallGuardConfig::default();
        let err = config
            .apply_overrides_from(|k| {
                (k == "CALL_GUARD_LOOKUP_TIMEOUT_MS").then(|| "soon".to_string())
            })
            .unwrap_err();
        assert!(matches!(err, CallGuardError::Config(_)));
    }
}
