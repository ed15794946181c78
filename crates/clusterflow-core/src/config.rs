//! Engine configuration
//!
//! Defaults first, then an optional YAML file, then `CLUSTERFLOW_*`
//! environment overrides. Invalid override values are logged and ignored.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::CoreError;

/// Environment variable naming an optional YAML config file
pub const CONFIG_FILE_ENV: &str = "CLUSTERFLOW_CONFIG";

/// Runtime and scheduler tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Delay between a pending poll attempt and the next one
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How often the polling scheduler scans for due entries
    #[serde(default = "default_scan_interval_ms")]
    pub scan_interval_ms: u64,

    /// Attempt budget for polling nodes that do not set their own
    #[serde(default)]
    pub default_max_attempts: Option<u32>,

    /// Deadline for polling nodes that do not set their own
    #[serde(default)]
    pub default_deadline_ms: Option<u64>,

    /// Extra save attempts after a failed persistence call
    #[serde(default = "default_persist_retries")]
    pub persist_retries: u32,

    /// Fixed pause between persistence retries
    #[serde(default = "default_persist_retry_backoff_ms")]
    pub persist_retry_backoff_ms: u64,

    /// Re-drive instances parked at an immediate node when recovering
    #[serde(default = "default_resume_immediate_on_recovery")]
    pub resume_immediate_on_recovery: bool,
}

fn default_poll_interval_ms() -> u64 {
    10_000
}

fn default_scan_interval_ms() -> u64 {
    10_000
}

fn default_persist_retries() -> u32 {
    3
}

fn default_persist_retry_backoff_ms() -> u64 {
    200
}

fn default_resume_immediate_on_recovery() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            scan_interval_ms: default_scan_interval_ms(),
            default_max_attempts: None,
            default_deadline_ms: None,
            persist_retries: default_persist_retries(),
            persist_retry_backoff_ms: default_persist_retry_backoff_ms(),
            resume_immediate_on_recovery: default_resume_immediate_on_recovery(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from the optional config file and environment
    pub fn load() -> Result<Self, CoreError> {
        let mut config = match env::var(CONFIG_FILE_ENV) {
            Ok(path) => {
                info!(path = %path, "Loading engine configuration file");
                Self::from_yaml_file(path)?
            }
            Err(_) => Self::default(),
        };

        config.apply_overrides(|key| env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML document; absent fields take their defaults
    pub fn from_yaml_str(yaml: &str) -> Result<Self, CoreError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a YAML config file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            CoreError::ConfigurationError(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&raw)
    }

    /// Apply `CLUSTERFLOW_*` overrides from the given lookup
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("CLUSTERFLOW_POLL_INTERVAL_MS") {
            match value.parse::<u64>() {
                Ok(ms) => self.poll_interval_ms = ms,
                Err(_) => warn!("Invalid CLUSTERFLOW_POLL_INTERVAL_MS value: {}", value),
            }
        }

        if let Some(value) = lookup("CLUSTERFLOW_SCAN_INTERVAL_MS") {
            match value.parse::<u64>() {
                Ok(ms) => self.scan_interval_ms = ms,
                Err(_) => warn!("Invalid CLUSTERFLOW_SCAN_INTERVAL_MS value: {}", value),
            }
        }

        if let Some(value) = lookup("CLUSTERFLOW_DEFAULT_MAX_ATTEMPTS") {
            match value.parse::<u32>() {
                Ok(attempts) => self.default_max_attempts = Some(attempts),
                Err(_) => warn!("Invalid CLUSTERFLOW_DEFAULT_MAX_ATTEMPTS value: {}", value),
            }
        }

        if let Some(value) = lookup("CLUSTERFLOW_DEFAULT_DEADLINE_MS") {
            match value.parse::<u64>() {
                Ok(ms) => self.default_deadline_ms = Some(ms),
                Err(_) => warn!("Invalid CLUSTERFLOW_DEFAULT_DEADLINE_MS value: {}", value),
            }
        }

        if let Some(value) = lookup("CLUSTERFLOW_PERSIST_RETRIES") {
            match value.parse::<u32>() {
                Ok(retries) => self.persist_retries = retries,
                Err(_) => warn!("Invalid CLUSTERFLOW_PERSIST_RETRIES value: {}", value),
            }
        }

        if let Some(value) = lookup("CLUSTERFLOW_PERSIST_RETRY_BACKOFF_MS") {
            match value.parse::<u64>() {
                Ok(ms) => self.persist_retry_backoff_ms = ms,
                Err(_) => warn!("Invalid CLUSTERFLOW_PERSIST_RETRY_BACKOFF_MS value: {}", value),
            }
        }

        if let Some(value) = lookup("CLUSTERFLOW_RESUME_IMMEDIATE_ON_RECOVERY") {
            match value.to_lowercase().as_str() {
                "true" | "1" => self.resume_immediate_on_recovery = true,
                "false" | "0" => self.resume_immediate_on_recovery = false,
                _ => warn!("Invalid CLUSTERFLOW_RESUME_IMMEDIATE_ON_RECOVERY value: {}", value),
            }
        }
    }

    /// Reject settings the scheduler cannot run with
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.scan_interval_ms == 0 {
            return Err(CoreError::ConfigurationError(
                "scan_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.default_max_attempts == Some(0) {
            return Err(CoreError::ConfigurationError(
                "default_max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Poll interval as a duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Scan interval as a duration
    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    /// Default polling deadline as a duration
    pub fn default_deadline(&self) -> Option<Duration> {
        self.default_deadline_ms.map(Duration::from_millis)
    }

    /// Persistence retry backoff as a duration
    pub fn persist_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.persist_retry_backoff_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(10));
        assert_eq!(config.scan_interval(), Duration::from_secs(10));
        assert_eq!(config.default_max_attempts, None);
        assert_eq!(config.persist_retries, 3);
        assert!(config.resume_immediate_on_recovery);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config = EngineConfig::from_yaml_str("poll_interval_ms: 500\ndefault_max_attempts: 20\n").unwrap();
        assert_eq!(config.poll_interval_ms, 500);
        assert_eq!(config.default_max_attempts, Some(20));
        assert_eq!(config.scan_interval_ms, 10_000);
        assert_eq!(config.persist_retry_backoff_ms, 200);
    }

    #[test]
    fn test_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "scan_interval_ms: 250\nresume_immediate_on_recovery: false").unwrap();

        let config = EngineConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.scan_interval_ms, 250);
        assert!(!config.resume_immediate_on_recovery);
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let err = EngineConfig::from_yaml_file("/nonexistent/clusterflow.yaml").unwrap_err();
        assert!(matches!(err, CoreError::ConfigurationError(_)));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("CLUSTERFLOW_POLL_INTERVAL_MS", "1500"),
            ("CLUSTERFLOW_PERSIST_RETRIES", "not-a-number"),
            ("CLUSTERFLOW_RESUME_IMMEDIATE_ON_RECOVERY", "0"),
            ("CLUSTERFLOW_DEFAULT_DEADLINE_MS", "60000"),
        ]);

        let mut config = EngineConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.poll_interval_ms, 1500);
        assert_eq!(config.persist_retries, 3);
        assert!(!config.resume_immediate_on_recovery);
        assert_eq!(config.default_deadline(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_validate_rejects_zero_scan_interval() {
        let config = EngineConfig {
            scan_interval_ms: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(CoreError::ConfigurationError(_))));
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let err = EngineConfig::from_yaml_str("default_max_attempts: 0").unwrap_err();
        assert!(matches!(err, CoreError::ConfigurationError(_)));
    }
}
