//! Import tool configuration rendered from a cluster's instances.

use serde::{Deserialize, Serialize};

use crate::domain::cluster::{Cluster, DataTransportRecord, StorageType};
use crate::error::{ClusterError, ClusterResult};
use crate::topology::{COMPONENT_PD, COMPONENT_TIDB};

/// Name of the config file written for each import
pub const IMPORT_CONFIG_FILE: &str = "import-config.yaml";

/// SQL endpoint the import writes through
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlEndpoint {
    /// TiDB host
    pub host: String,
    /// SQL port
    pub port: u16,
    /// Status port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_port: Option<u16>,
    /// Placement driver address, `host:port`
    pub pd_addr: String,
}

/// Where the data files come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSource {
    /// Directory of the data files
    pub data_source_dir: String,
    /// Storage backend of the directory
    pub storage_type: StorageType,
    /// Data file format
    pub file_type: String,
}

/// Config handed to the import tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Target cluster name
    pub cluster_name: String,
    /// SQL endpoint of the cluster
    pub tidb: SqlEndpoint,
    /// Input files
    pub source: DataSource,
    /// Import backend
    pub backend: String,
}

impl ImportConfig {
    /// Config for loading `record`'s files into `cluster`
    ///
    /// Uses the first TiDB and PD instances of the cluster.
    pub fn for_cluster(cluster: &Cluster, record: &DataTransportRecord) -> ClusterResult<Self> {
        let first = |component: &str| {
            cluster
                .instances
                .iter()
                .find(|i| i.component_type.eq_ignore_ascii_case(component))
                .ok_or_else(|| {
                    ClusterError::InvalidTopology(format!("cluster {} has no {} instance", cluster.id, component))
                })
        };

        let tidb = first(COMPONENT_TIDB)?;
        let pd = first(COMPONENT_PD)?;
        let pd_port = pd.ports.first().copied().ok_or_else(|| {
            ClusterError::InvalidTopology(format!("PD host {} has no client port", pd.host_id))
        })?;

        Ok(Self {
            cluster_name: cluster.name.clone(),
            tidb: SqlEndpoint {
                host: tidb.ip.clone(),
                port: tidb.ports.first().copied().unwrap_or(4000),
                status_port: tidb.ports.get(1).copied(),
                pd_addr: format!("{}:{}", pd.ip, pd_port),
            },
            source: DataSource {
                data_source_dir: record.file_path.clone(),
                storage_type: record.storage_type,
                file_type: record.file_type.clone(),
            },
            backend: "local".to_string(),
        })
    }

    /// As YAML
    pub fn to_yaml(&self) -> ClusterResult<String> {
        serde_yaml::to_string(self).map_err(|e| ClusterError::Core(e.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clusterflow_core::HostAssignment;

    fn host(component: &str, ip: &str, ports: Vec<u16>) -> HostAssignment {
        HostAssignment {
            component_type: component.to_string(),
            host_id: format!("{}-{}", component, ip),
            ip: ip.to_string(),
            ports,
            zone_code: "zone-a".to_string(),
            spec_code: "4C8G".to_string(),
            disk_path: "/data".to_string(),
        }
    }

    #[test]
    fn test_config_uses_first_tidb_and_pd() {
        let mut cluster = Cluster::new("orders", "TiDB", "v5.0.0", "tenant-1", vec![]);
        cluster.bring_online(vec![
            host("PD", "10.0.0.1", vec![2379, 2380]),
            host("TiDB", "10.0.0.2", vec![4000, 10080]),
            host("TiDB", "10.0.0.3", vec![4000, 10080]),
        ]);
        let record = DataTransportRecord::import(cluster.id.clone(), StorageType::S3, "/bucket/orders");

        let config = ImportConfig::for_cluster(&cluster, &record).unwrap();
        assert_eq!(config.tidb.host, "10.0.0.2");
        assert_eq!(config.tidb.status_port, Some(10080));
        assert_eq!(config.tidb.pd_addr, "10.0.0.1:2379");
        assert_eq!(config.source.data_source_dir, "/bucket/orders");

        let yaml = config.to_yaml().unwrap();
        assert!(yaml.contains("10.0.0.1:2379"));
        assert!(yaml.contains("data_source_dir: /bucket/orders"));
    }

    #[test]
    fn test_config_needs_sql_endpoint() {
        let mut cluster = Cluster::new("orders", "TiDB", "v5.0.0", "tenant-1", vec![]);
        cluster.bring_online(vec![host("PD", "10.0.0.1", vec![2379])]);
        let record = DataTransportRecord::import(cluster.id.clone(), StorageType::Local, "/tmp/orders");

        assert!(matches!(
            ImportConfig::for_cluster(&cluster, &record),
            Err(ClusterError::InvalidTopology(_))
        ));
    }
}
