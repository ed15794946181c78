//! Logging setup for the clusterflow control plane.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod logging;

pub use logging::{init_logging, LogExt};

/// Configuration for log output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Service name attached to the startup record
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Filter directives (e.g., "info,clusterflow_core=debug"); `RUST_LOG` wins when set
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,

    /// Also write JSON logs to this file, rotated daily
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

fn default_service_name() -> String {
    "clusterflowd".to_string()
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            log_filter: default_log_filter(),
            json: false,
            log_file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.service_name, "clusterflowd");
        assert_eq!(config.log_filter, "info");
        assert!(!config.json);
        assert!(config.log_file.is_none());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config: LoggingConfig = serde_yaml::from_str("json: true\nlog_file: /var/log/cf.log\n").unwrap();
        assert!(config.json);
        assert_eq!(config.log_file, Some(PathBuf::from("/var/log/cf.log")));
        assert_eq!(config.log_filter, "info");
    }
}
