//! The cluster aggregate and its backup records.

use chrono::{DateTime, Utc};
use clusterflow_core::{ComponentDemand, HostAssignment};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::spec_code::SpecCode;
use crate::error::{ClusterError, ClusterResult};

/// Lifecycle status of a cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterStatus {
    /// Created, not yet deployed
    Initializing,
    /// Deployed and started
    Online,
    /// Torn down
    Deleted,
}

/// Workflow currently holding a cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Maintenance {
    /// CreateCluster is running
    Creating,
    /// ScaleOutCluster is running
    ScalingOut,
    /// DeleteCluster is running
    Deleting,
    /// BackupCluster is running
    BackingUp,
    /// RestoreCluster is running
    Restoring,
    /// ExportData is running
    Exporting,
    /// ImportData is running
    Importing,
}

impl fmt::Display for Maintenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A managed database cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    /// Cluster id; the business id of its workflows
    pub id: String,
    /// Display name
    pub name: String,
    /// Database type, e.g. "TiDB"
    pub cluster_type: String,
    /// Database version
    pub version: String,
    /// Owning tenant
    pub tenant_id: String,
    /// Lifecycle status
    pub status: ClusterStatus,
    /// Running workflow, if any
    pub maintenance: Option<Maintenance>,
    /// Requested components
    pub demands: Vec<ComponentDemand>,
    /// Deployed component instances
    pub instances: Vec<HostAssignment>,
    /// Last workflow started for this cluster
    pub workflow_id: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

impl Cluster {
    /// A new cluster in `Initializing`
    pub fn new(
        name: impl Into<String>,
        cluster_type: impl Into<String>,
        version: impl Into<String>,
        tenant_id: impl Into<String>,
        demands: Vec<ComponentDemand>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            cluster_type: cluster_type.into(),
            version: version.into(),
            tenant_id: tenant_id.into(),
            status: ClusterStatus::Initializing,
            maintenance: None,
            demands,
            instances: Vec::new(),
            workflow_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Claim the cluster for a workflow
    pub fn begin_maintenance(&mut self, maintenance: Maintenance) -> ClusterResult<()> {
        if let Some(current) = self.maintenance {
            return Err(ClusterError::ClusterBusy {
                cluster_id: self.id.clone(),
                maintenance: current,
            });
        }
        self.maintenance = Some(maintenance);
        self.touch();
        Ok(())
    }

    /// Release the cluster
    pub fn end_maintenance(&mut self) {
        self.maintenance = None;
        self.touch();
    }

    /// Fail unless the cluster is online
    pub fn ensure_online(&self) -> ClusterResult<()> {
        if self.status != ClusterStatus::Online {
            return Err(ClusterError::InvalidState(format!(
                "cluster {} is {:?}, expected Online",
                self.id, self.status
            )));
        }
        Ok(())
    }

    /// Record deployed instances and mark the cluster online
    pub fn bring_online(&mut self, instances: Vec<HostAssignment>) {
        for instance in instances {
            if !self.instances.iter().any(|i| i.host_id == instance.host_id && i.component_type == instance.component_type) {
                self.instances.push(instance);
            }
        }
        self.status = ClusterStatus::Online;
        self.touch();
    }

    /// Mark the cluster torn down
    pub fn mark_deleted(&mut self) {
        self.status = ClusterStatus::Deleted;
        self.instances.clear();
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Check that a demand is internally consistent
///
/// Every distribution item needs a valid spec code, and the item counts
/// must add up to the component's total.
pub fn validate_demands(demands: &[ComponentDemand]) -> ClusterResult<()> {
    if demands.is_empty() {
        return Err(ClusterError::InvalidDemand("no components requested".to_string()));
    }

    for demand in demands {
        if demand.component_type.trim().is_empty() {
            return Err(ClusterError::InvalidDemand("component type is empty".to_string()));
        }

        let mut placed = 0;
        for item in &demand.distribution {
            item.spec_code.parse::<SpecCode>()?;
            placed += item.count;
        }

        if placed != demand.total_count {
            return Err(ClusterError::InvalidDemand(format!(
                "{}: distribution places {} of {} nodes",
                demand.component_type, placed, demand.total_count
            )));
        }
    }

    Ok(())
}

/// Where a backup is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageType {
    /// Shared filesystem
    Local,
    /// Object storage
    S3,
}

/// Progress of a backup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackupStatus {
    /// Backup workflow running
    Processing,
    /// Backup written
    Finished,
    /// Backup workflow failed
    Failed,
}

/// One backup of a cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupRecord {
    /// Record id
    pub id: String,
    /// Backed up cluster
    pub cluster_id: String,
    /// Storage backend
    pub storage_type: StorageType,
    /// Location within the storage backend
    pub file_path: String,
    /// Progress
    pub status: BackupStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Completion time
    pub finished_at: Option<DateTime<Utc>>,
}

impl BackupRecord {
    /// A new record stored under `/{cluster_id}/{record_id}`
    pub fn new(cluster_id: impl Into<String>, storage_type: StorageType) -> Self {
        let cluster_id = cluster_id.into();
        let id = Uuid::new_v4().to_string();
        Self {
            file_path: format!("/{}/{}", cluster_id, id),
            id,
            cluster_id,
            storage_type,
            status: BackupStatus::Processing,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Mark the backup written
    pub fn finish(&mut self) {
        self.status = BackupStatus::Finished;
        self.finished_at = Some(Utc::now());
    }

    /// Mark the backup failed
    pub fn fail(&mut self) {
        self.status = BackupStatus::Failed;
        self.finished_at = Some(Utc::now());
    }
}

/// Direction of a data transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportType {
    /// Data dumped out of the cluster
    Export,
    /// Data loaded into the cluster
    Import,
}

/// Progress of a data transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportStatus {
    /// Transport workflow running
    Processing,
    /// Data moved
    Finished,
    /// Transport workflow failed
    Failed,
}

/// One export from or import into a cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataTransportRecord {
    /// Record id
    pub id: String,
    /// Cluster the data moves out of or into
    pub cluster_id: String,
    /// Direction
    pub transport_type: TransportType,
    /// Storage backend holding the data files
    pub storage_type: StorageType,
    /// Location of the data files within the storage backend
    pub file_path: String,
    /// Data file format, e.g. "csv"
    pub file_type: String,
    /// Table filter of an export
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    /// Import tool config rendered for this record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_path: Option<String>,
    /// Progress
    pub status: TransportStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Completion time
    pub finished_at: Option<DateTime<Utc>>,
}

impl DataTransportRecord {
    /// An export written to `/{cluster_id}/export/{record_id}`
    pub fn export(
        cluster_id: impl Into<String>,
        storage_type: StorageType,
        file_type: impl Into<String>,
        filter: Option<String>,
    ) -> Self {
        let cluster_id = cluster_id.into();
        let id = Uuid::new_v4().to_string();
        Self {
            file_path: format!("/{}/export/{}", cluster_id, id),
            id,
            cluster_id,
            transport_type: TransportType::Export,
            storage_type,
            file_type: file_type.into(),
            filter,
            config_path: None,
            status: TransportStatus::Processing,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    /// An import reading the data files at `file_path`
    pub fn import(
        cluster_id: impl Into<String>,
        storage_type: StorageType,
        file_path: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            cluster_id: cluster_id.into(),
            transport_type: TransportType::Import,
            storage_type,
            file_path: file_path.into(),
            file_type: "csv".to_string(),
            filter: None,
            config_path: None,
            status: TransportStatus::Processing,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Mark the data moved
    pub fn finish(&mut self) {
        self.status = TransportStatus::Finished;
        self.finished_at = Some(Utc::now());
    }

    /// Mark the transport failed
    pub fn fail(&mut self) {
        self.status = TransportStatus::Failed;
        self.finished_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clusterflow_core::DistributionItem;

    fn demand(total: u32, items: &[(&str, u32)]) -> ComponentDemand {
        ComponentDemand {
            component_type: "TiKV".to_string(),
            total_count: total,
            distribution: items
                .iter()
                .map(|(spec, count)| DistributionItem {
                    zone_code: "zone-a".to_string(),
                    spec_code: spec.to_string(),
                    count: *count,
                })
                .collect(),
        }
    }

    #[test]
    fn test_maintenance_is_exclusive() {
        let mut cluster = Cluster::new("orders", "TiDB", "v5.0.0", "tenant-1", vec![]);
        cluster.begin_maintenance(Maintenance::Creating).unwrap();

        let err = cluster.begin_maintenance(Maintenance::BackingUp).unwrap_err();
        assert_eq!(
            err,
            ClusterError::ClusterBusy {
                cluster_id: cluster.id.clone(),
                maintenance: Maintenance::Creating,
            }
        );

        cluster.end_maintenance();
        assert!(cluster.begin_maintenance(Maintenance::BackingUp).is_ok());
    }

    #[test]
    fn test_validate_demands() {
        assert!(validate_demands(&[demand(3, &[("4C8G", 2), ("8C16G", 1)])]).is_ok());
        assert!(matches!(validate_demands(&[]), Err(ClusterError::InvalidDemand(_))));
        assert!(matches!(
            validate_demands(&[demand(3, &[("4C8G", 2)])]),
            Err(ClusterError::InvalidDemand(_))
        ));
        assert!(matches!(
            validate_demands(&[demand(1, &[("large", 1)])]),
            Err(ClusterError::InvalidSpecCode(_))
        ));
    }

    #[test]
    fn test_bring_online_keeps_existing_instances() {
        let host = |id: &str| HostAssignment {
            component_type: "TiKV".to_string(),
            host_id: id.to_string(),
            ip: "10.0.0.1".to_string(),
            ports: vec![20160],
            zone_code: "zone-a".to_string(),
            spec_code: "4C8G".to_string(),
            disk_path: "/data".to_string(),
        };

        let mut cluster = Cluster::new("orders", "TiDB", "v5.0.0", "tenant-1", vec![]);
        cluster.bring_online(vec![host("h1")]);
        cluster.bring_online(vec![host("h1"), host("h2")]);

        assert_eq!(cluster.status, ClusterStatus::Online);
        assert_eq!(cluster.instances.len(), 2);
    }

    #[test]
    fn test_backup_record_path() {
        let record = BackupRecord::new("c-1", StorageType::S3);
        assert_eq!(record.file_path, format!("/c-1/{}", record.id));
        assert_eq!(record.status, BackupStatus::Processing);
    }

    #[test]
    fn test_transport_records() {
        let mut export = DataTransportRecord::export("c-1", StorageType::Local, "csv", Some("orders.*".to_string()));
        assert_eq!(export.file_path, format!("/c-1/export/{}", export.id));
        assert_eq!(export.transport_type, TransportType::Export);
        assert_eq!(export.status, TransportStatus::Processing);

        export.fail();
        assert_eq!(export.status, TransportStatus::Failed);
        assert!(export.finished_at.is_some());

        let import = DataTransportRecord::import("c-1", StorageType::S3, "/bucket/orders");
        assert_eq!(import.file_path, "/bucket/orders");
        assert_eq!(import.transport_type, TransportType::Import);
        assert!(import.config_path.is_none());
    }
}
