//! Flow context entries shared by the cluster workflow steps.

use clusterflow_core::{AllocationResult, ComponentDemand, ContextKey, OperationHandle};

use crate::topology::TopologyConfig;

/// Cluster the workflow acts on
pub const CLUSTER_ID: ContextKey<String> = ContextKey::new("cluster_id");

/// Components added by a scale-out
pub const SCALE_OUT_DEMANDS: ContextKey<Vec<ComponentDemand>> = ContextKey::new("scale_out_demands");

/// Hosts reserved by prepare_resource
pub const ALLOCATION: ContextKey<AllocationResult> = ContextKey::new("allocation");

/// Topology built from the allocation
pub const TOPOLOGY: ContextKey<TopologyConfig> = ContextKey::new("topology");

/// Backup record the workflow writes or reads
pub const BACKUP_RECORD: ContextKey<String> = ContextKey::new("backup_record_id");

/// Running deploy operation
pub const DEPLOY_HANDLE: ContextKey<OperationHandle> = ContextKey::new("deploy_handle");

/// Running start operation
pub const START_HANDLE: ContextKey<OperationHandle> = ContextKey::new("start_handle");

/// Running scale-out operation
pub const SCALE_OUT_HANDLE: ContextKey<OperationHandle> = ContextKey::new("scale_out_handle");

/// Running destroy operation
pub const DESTROY_HANDLE: ContextKey<OperationHandle> = ContextKey::new("destroy_handle");

/// Running backup operation
pub const BACKUP_HANDLE: ContextKey<OperationHandle> = ContextKey::new("backup_handle");

/// Running restore operation
pub const RESTORE_HANDLE: ContextKey<OperationHandle> = ContextKey::new("restore_handle");

/// Data transport record the workflow moves data for
pub const TRANSPORT_RECORD: ContextKey<String> = ContextKey::new("transport_record_id");

/// Rendered import tool config
pub const IMPORT_CONFIG: ContextKey<String> = ContextKey::new("import_config_path");

/// Running destroy-tasks operation
pub const DESTROY_TASKS_HANDLE: ContextKey<OperationHandle> = ContextKey::new("destroy_tasks_handle");

/// Running export operation
pub const EXPORT_HANDLE: ContextKey<OperationHandle> = ContextKey::new("export_handle");

/// Running import operation
pub const IMPORT_HANDLE: ContextKey<OperationHandle> = ContextKey::new("import_handle");
