//!
//! Clusterflow Cluster - cluster management workflows
//!
//! Flow templates for creating, scaling out, deleting, backing up,
//! restoring, exporting from and importing into database clusters, the
//! cluster aggregate they act on, and the manager that starts them.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Typed flow context keys
pub mod context;

/// Cluster aggregate and repository
pub mod domain;

/// Error types
pub mod error;

/// Flow templates and registration
pub mod flows;

/// Simulated allocator and operation executor
pub mod local;

/// Workflow entry points
pub mod manager;

/// Node executors
pub mod steps;

/// Deployment topology
pub mod topology;

/// Import tool configuration
pub mod transport;

pub use domain::cluster::{
    validate_demands, BackupRecord, BackupStatus, Cluster, ClusterStatus, DataTransportRecord,
    Maintenance, StorageType, TransportStatus, TransportType,
};
pub use domain::repository::{ClusterRepository, InMemoryClusterRepository};
pub use domain::spec_code::SpecCode;
pub use error::{ClusterError, ClusterResult};
pub use flows::{
    register_cluster_flows, ClusterFlowDeps, BACKUP_CLUSTER, CREATE_CLUSTER, DELETE_CLUSTER,
    EXPORT_DATA, IMPORT_DATA, RESTORE_CLUSTER, SCALE_OUT_CLUSTER,
};
pub use local::{LocalOperationExecutor, LocalResourceAllocator};
pub use manager::{
    ClusterManager, ClusterOperationResponse, CreateClusterRequest, DataExportRequest,
    DataImportRequest,
};
pub use topology::TopologyConfig;
pub use transport::ImportConfig;
