//! Deployment topology rendered from an allocation.
//!
//! The YAML form is the payload handed to the deploy and scale-out
//! operations. Monitoring components are placed on the first PD host.

use clusterflow_core::{AllocationResult, HostAssignment};
use serde::{Deserialize, Serialize};

use crate::error::{ClusterError, ClusterResult};

/// Placement driver component type
pub const COMPONENT_PD: &str = "PD";
/// SQL layer component type
pub const COMPONENT_TIDB: &str = "TiDB";
/// Storage component type
pub const COMPONENT_TIKV: &str = "TiKV";

/// Options shared by every server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalOptions {
    /// OS user the processes run as
    pub user: String,
    /// SSH port of every host
    pub ssh_port: u16,
    /// CPU architecture
    pub arch: String,
    /// Default deploy directory
    pub deploy_dir: String,
    /// Default data directory
    pub data_dir: String,
    /// Log directory
    pub log_dir: String,
}

impl GlobalOptions {
    fn for_disk(disk_path: &str) -> Self {
        let disk = disk_path.trim_end_matches('/');
        Self {
            user: "tidb".to_string(),
            ssh_port: 22,
            arch: "amd64".to_string(),
            deploy_dir: format!("{}/deploy", disk),
            data_dir: format!("{}/data", disk),
            log_dir: "/tidb-log".to_string(),
        }
    }
}

/// One component process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSpec {
    /// Host address
    pub host: String,
    /// Service port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Status or peer port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_port: Option<u16>,
    /// Deploy directory on the host
    pub deploy_dir: String,
    /// Data directory on the host
    pub data_dir: String,
}

impl From<&HostAssignment> for ServerSpec {
    fn from(host: &HostAssignment) -> Self {
        let disk = host.disk_path.trim_end_matches('/');
        Self {
            host: host.ip.clone(),
            port: host.ports.first().copied(),
            status_port: host.ports.get(1).copied(),
            deploy_dir: format!("{}/deploy", disk),
            data_dir: format!("{}/data", disk),
        }
    }
}

/// A monitoring component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorSpec {
    /// Host address
    pub host: String,
}

/// Full topology of a deploy or scale-out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyConfig {
    /// Shared options; absent for scale-out
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global: Option<GlobalOptions>,
    /// PD servers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pd_servers: Vec<ServerSpec>,
    /// TiDB servers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tidb_servers: Vec<ServerSpec>,
    /// TiKV servers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tikv_servers: Vec<ServerSpec>,
    /// Prometheus
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub monitoring_servers: Vec<MonitorSpec>,
    /// Grafana
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub grafana_servers: Vec<MonitorSpec>,
    /// Alertmanager
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alertmanager_servers: Vec<MonitorSpec>,
}

impl TopologyConfig {
    /// Topology for a new cluster; needs at least one PD host
    pub fn for_deploy(allocation: &AllocationResult) -> ClusterResult<Self> {
        let first_pd = allocation.hosts_for(COMPONENT_PD).next().ok_or_else(|| {
            ClusterError::InvalidTopology("allocation has no PD host".to_string())
        })?;

        let monitor = vec![MonitorSpec {
            host: first_pd.ip.clone(),
        }];

        Ok(Self {
            global: Some(GlobalOptions::for_disk(&first_pd.disk_path)),
            monitoring_servers: monitor.clone(),
            grafana_servers: monitor.clone(),
            alertmanager_servers: monitor,
            ..Self::servers(allocation)
        })
    }

    /// Topology of the servers added by a scale-out
    pub fn for_scale_out(allocation: &AllocationResult) -> ClusterResult<Self> {
        let topology = Self::servers(allocation);
        if topology.server_count() == 0 {
            return Err(ClusterError::InvalidTopology(
                "allocation has no servers to add".to_string(),
            ));
        }
        Ok(topology)
    }

    fn servers(allocation: &AllocationResult) -> Self {
        let specs = |component: &str| -> Vec<ServerSpec> {
            allocation.hosts_for(component).map(ServerSpec::from).collect()
        };

        Self {
            global: None,
            pd_servers: specs(COMPONENT_PD),
            tidb_servers: specs(COMPONENT_TIDB),
            tikv_servers: specs(COMPONENT_TIKV),
            monitoring_servers: Vec::new(),
            grafana_servers: Vec::new(),
            alertmanager_servers: Vec::new(),
        }
    }

    /// Number of database servers
    pub fn server_count(&self) -> usize {
        self.pd_servers.len() + self.tidb_servers.len() + self.tikv_servers.len()
    }

    /// Render as YAML
    pub fn to_yaml(&self) -> ClusterResult<String> {
        serde_yaml::to_string(self).map_err(|e| ClusterError::Core(e.into()))
    }
}
