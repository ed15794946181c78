use clusterflow_core::CoreError;
use thiserror::Error;

use crate::domain::cluster::Maintenance;

/// Errors returned by cluster management
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClusterError {
    /// Unknown cluster
    #[error("Cluster not found: {0}")]
    ClusterNotFound(String),

    /// Another workflow owns the cluster
    #[error("Cluster {cluster_id} is busy: {maintenance}")]
    ClusterBusy {
        /// Target cluster
        cluster_id: String,
        /// Maintenance already in progress
        maintenance: Maintenance,
    },

    /// The cluster cannot accept the operation in its current status
    #[error("Invalid cluster state: {0}")]
    InvalidState(String),

    /// Unknown backup record
    #[error("Backup record not found: {0}")]
    BackupRecordNotFound(String),

    /// Unknown data transport record
    #[error("Transport record not found: {0}")]
    TransportRecordNotFound(String),

    /// Export or import request that cannot be carried out
    #[error("Invalid transport request: {0}")]
    InvalidTransport(String),

    /// Malformed `{cpu}C{memory}G` code
    #[error("Invalid spec code: {0}")]
    InvalidSpecCode(String),

    /// Inconsistent component demand
    #[error("Invalid demand: {0}")]
    InvalidDemand(String),

    /// Topology cannot be built from the allocation
    #[error("Invalid topology: {0}")]
    InvalidTopology(String),

    /// Engine or storage failure
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl From<ClusterError> for CoreError {
    fn from(err: ClusterError) -> Self {
        match err {
            ClusterError::Core(inner) => inner,
            other => CoreError::NodeExecutionError(other.to_string()),
        }
    }
}

/// Result alias for cluster operations
pub type ClusterResult<T> = Result<T, ClusterError>;
