//! Contracts for the external collaborators node executors call.
//!
//! Implementations must be safe to call concurrently from different flow
//! instances; the engine serializes calls only within one instance.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::CoreError;

/// Placement of part of a component's nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionItem {
    /// Availability zone
    pub zone_code: String,

    /// Host spec such as `8C16G`
    pub spec_code: String,

    /// Nodes to place with this zone and spec
    pub count: u32,
}

/// Demand for one component type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentDemand {
    /// Component type such as `TiDB` or `TiKV`
    pub component_type: String,

    /// Total nodes requested
    pub total_count: u32,

    /// Zone and spec breakdown
    pub distribution: Vec<DistributionItem>,
}

/// Resources requested for a cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyDemand {
    /// Cluster the resources are for
    pub cluster_id: String,

    /// Per-component demand
    pub components: Vec<ComponentDemand>,
}

/// One allocated component node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostAssignment {
    /// Component type served by this host
    pub component_type: String,

    /// Host id
    pub host_id: String,

    /// Host address
    pub ip: String,

    /// Ports reserved for the component
    pub ports: Vec<u16>,

    /// Availability zone
    pub zone_code: String,

    /// Host spec
    pub spec_code: String,

    /// Data disk mount
    pub disk_path: String,
}

/// Concrete hosts for a demand
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationResult {
    /// Assigned hosts
    pub hosts: Vec<HostAssignment>,
}

impl AllocationResult {
    /// Hosts assigned to a component type
    pub fn hosts_for<'a>(&'a self, component_type: &'a str) -> impl Iterator<Item = &'a HostAssignment> + 'a {
        self.hosts
            .iter()
            .filter(move |h| h.component_type.eq_ignore_ascii_case(component_type))
    }
}

/// Allocates hosts and ports
#[async_trait]
pub trait ResourceAllocator: Send + Sync {
    /// Reserve resources for a demand
    async fn allocate(&self, demand: &TopologyDemand) -> Result<AllocationResult, CoreError>;

    /// Return a cluster's resources
    async fn release(&self, cluster_id: &str) -> Result<(), CoreError> {
        let _ = cluster_id;
        Ok(())
    }
}

/// Kind of external long-running action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    /// Deploy a new cluster
    Deploy,
    /// Add nodes to a cluster
    ScaleOut,
    /// Start cluster processes
    Start,
    /// Stop cluster processes
    Stop,
    /// Tear down a cluster
    Destroy,
    /// Take a backup
    Backup,
    /// Restore from a backup
    Restore,
    /// Stop the background jobs of a cluster before it is destroyed
    DestroyTasks,
    /// Dump data out of a cluster
    Export,
    /// Load data into a cluster
    Import,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Request to start an external action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationParams {
    /// What to do
    pub kind: OperationKind,

    /// Target cluster
    pub cluster_id: String,

    /// Tool-specific arguments, e.g. a rendered topology
    pub payload: Value,
}

/// Identifies a started action
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationHandle(pub String);

impl fmt::Display for OperationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// State of a started action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationStatus {
    /// Still running
    Pending,
    /// Finished successfully
    Success,
    /// Finished with an error
    Failed(String),
}

/// Runs deploy/backup/restore tooling
#[async_trait]
pub trait OperationExecutor: Send + Sync {
    /// Start an action
    async fn invoke(&self, params: &OperationParams) -> Result<OperationHandle, CoreError>;

    /// Check a started action
    async fn check_status(&self, handle: &OperationHandle) -> Result<OperationStatus, CoreError>;
}
