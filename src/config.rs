//! Daemon configuration
//!
//! Same layering as the engine configuration: defaults, then the YAML file
//! named by `CLUSTERFLOW_CONFIG`, then environment overrides.

use anyhow::{Context, Result};
use clusterflow_cluster::CreateClusterRequest;
use clusterflow_core::config::CONFIG_FILE_ENV;
use clusterflow_core::{EngineConfig, PollingPolicy};
use clusterflow_monitoring::LoggingConfig;
use clusterflow_state_sqlite::SqliteConfig;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Simulated collaborators used when no real tooling is wired in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalModeConfig {
    /// Hosts in the local pool
    #[serde(default = "default_host_capacity")]
    pub host_capacity: usize,

    /// Status checks before a local operation succeeds
    #[serde(default = "default_operation_checks")]
    pub operation_checks: u32,
}

fn default_host_capacity() -> usize {
    64
}

fn default_operation_checks() -> u32 {
    3
}

impl Default for LocalModeConfig {
    fn default() -> Self {
        Self {
            host_capacity: default_host_capacity(),
            operation_checks: default_operation_checks(),
        }
    }
}

/// Budget of the cluster operation polling nodes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationPollingConfig {
    /// Attempts before an operation is given up
    #[serde(default)]
    pub max_attempts: Option<u32>,

    /// Time allowed per operation
    #[serde(default)]
    pub deadline_ms: Option<u64>,
}

impl OperationPollingConfig {
    /// As a node polling policy
    pub fn policy(&self) -> PollingPolicy {
        PollingPolicy {
            max_attempts: self.max_attempts,
            deadline: self.deadline_ms.map(Duration::from_millis),
            interval: None,
        }
    }
}

/// Data export and import settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Directory import configs are rendered into
    #[serde(default = "default_transport_dir")]
    pub work_dir: PathBuf,
}

fn default_transport_dir() -> PathBuf {
    env::temp_dir().join("clusterflow-transport")
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            work_dir: default_transport_dir(),
        }
    }
}

/// Everything `clusterflowd` needs to start
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Durable flow state
    #[serde(default)]
    pub storage: SqliteConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Runtime and scheduler tuning
    #[serde(default)]
    pub engine: EngineConfig,

    /// Operation polling budget
    #[serde(default)]
    pub operations: OperationPollingConfig,

    /// Simulated collaborators
    #[serde(default)]
    pub local: LocalModeConfig,

    /// Data export and import
    #[serde(default)]
    pub transport: TransportConfig,

    /// Clusters created when the daemon starts
    #[serde(default)]
    pub bootstrap_clusters: Vec<CreateClusterRequest>,
}

impl DaemonConfig {
    /// Load from the optional config file and the environment
    pub fn load() -> Result<Self> {
        let mut config = match env::var(CONFIG_FILE_ENV) {
            Ok(path) => Self::from_yaml_file(&path)?,
            Err(_) => Self::default(),
        };

        config.apply_overrides(|key| env::var(key).ok());
        config.engine.validate().context("Invalid engine configuration")?;
        Ok(config)
    }

    /// Read and parse a YAML config file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read {}", path.display()))?;
        serde_yaml::from_str(&raw).with_context(|| format!("Cannot parse {}", path.display()))
    }

    /// Apply `CLUSTERFLOW_*` overrides from the given lookup
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        self.engine.apply_overrides(&lookup);

        if let Some(url) = lookup("CLUSTERFLOW_DATABASE_URL") {
            self.storage.database_url = url;
        }

        if let Some(filter) = lookup("CLUSTERFLOW_LOG_FILTER") {
            self.logging.log_filter = filter;
        }

        if let Some(value) = lookup("CLUSTERFLOW_LOG_JSON") {
            match value.parse::<bool>() {
                Ok(json) => self.logging.json = json,
                Err(_) => warn!("Invalid CLUSTERFLOW_LOG_JSON value: {}", value),
            }
        }

        if let Some(dir) = lookup("CLUSTERFLOW_TRANSPORT_DIR") {
            self.transport.work_dir = PathBuf::from(dir);
        }

        if let Some(value) = lookup("CLUSTERFLOW_LOCAL_OPERATION_CHECKS") {
            match value.parse::<u32>() {
                Ok(checks) => self.local.operation_checks = checks,
                Err(_) => warn!("Invalid CLUSTERFLOW_LOCAL_OPERATION_CHECKS value: {}", value),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = DaemonConfig::default();
        assert_eq!(config.storage.database_url, "sqlite://clusterflow.db");
        assert_eq!(config.engine, EngineConfig::default());
        assert_eq!(config.local.operation_checks, 3);
        assert!(config.bootstrap_clusters.is_empty());
        assert_eq!(config.operations.policy(), PollingPolicy::default());
        assert!(config.transport.work_dir.ends_with("clusterflow-transport"));
    }

    #[test]
    fn test_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "storage:\n  database_url: \"sqlite::memory:\"\nengine:\n  poll_interval_ms: 500\noperations:\n  max_attempts: 120\nlocal:\n  operation_checks: 1\nbootstrap_clusters:\n  - name: orders\n    cluster_type: TiDB\n    version: v5.0.0\n    tenant_id: tenant-1\n    demands:\n      - component_type: PD\n        total_count: 1\n        distribution:\n          - zone_code: zone-a\n            spec_code: 4C8G\n            count: 1\n"
        )
        .unwrap();

        let config = DaemonConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.storage.database_url, "sqlite::memory:");
        assert_eq!(config.engine.poll_interval_ms, 500);
        assert_eq!(config.engine.scan_interval_ms, EngineConfig::default().scan_interval_ms);
        assert_eq!(config.operations.policy().max_attempts, Some(120));
        assert_eq!(config.local.operation_checks, 1);
        assert_eq!(config.local.host_capacity, 64);
        assert_eq!(config.bootstrap_clusters.len(), 1);
        assert_eq!(config.bootstrap_clusters[0].demands[0].distribution[0].spec_code, "4C8G");
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("CLUSTERFLOW_DATABASE_URL", "sqlite:///var/lib/clusterflow.db"),
            ("CLUSTERFLOW_LOG_JSON", "true"),
            ("CLUSTERFLOW_LOCAL_OPERATION_CHECKS", "many"),
            ("CLUSTERFLOW_POLL_INTERVAL_MS", "250"),
            ("CLUSTERFLOW_TRANSPORT_DIR", "/var/lib/clusterflow/transport"),
        ]
        .into_iter()
        .collect();

        let mut config = DaemonConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.storage.database_url, "sqlite:///var/lib/clusterflow.db");
        assert!(config.logging.json);
        assert_eq!(config.local.operation_checks, 3);
        assert_eq!(config.engine.poll_interval_ms, 250);
        assert_eq!(config.transport.work_dir, PathBuf::from("/var/lib/clusterflow/transport"));
    }
}
