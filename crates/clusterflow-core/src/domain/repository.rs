//! Persistence gateway for the engine
//!
//! The runtime only talks to storage through these traits. Adapter crates
//! provide the implementations.

use async_trait::async_trait;
use std::sync::Arc;

use super::flow_instance::{FlowInstance, FlowInstanceId};
use super::node_state::NodeState;
use crate::CoreError;

/// Repository for flow instances
#[async_trait]
pub trait FlowInstanceRepository: Send + Sync {
    /// Insert or replace an instance
    async fn save(&self, instance: &FlowInstance) -> Result<(), CoreError>;

    /// Find an instance by id
    async fn find_by_id(&self, id: &FlowInstanceId) -> Result<Option<FlowInstance>, CoreError>;

    /// Instances in `Processing`
    async fn find_active(&self) -> Result<Vec<FlowInstance>, CoreError>;

    /// Instances acting on a business entity, oldest first
    async fn find_by_biz_id(&self, biz_id: &str) -> Result<Vec<FlowInstance>, CoreError>;
}

/// Repository for node execution records
#[async_trait]
pub trait NodeStateRepository: Send + Sync {
    /// Insert or replace a record, keyed by its id
    async fn save(&self, state: &NodeState) -> Result<(), CoreError>;

    /// Records for one instance in the order they were first saved
    async fn find_for_flow(&self, flow_id: &FlowInstanceId) -> Result<Vec<NodeState>, CoreError>;
}

/// The engine's view of durable storage
#[derive(Clone)]
pub struct PersistenceGateway {
    instances: Arc<dyn FlowInstanceRepository>,
    nodes: Arc<dyn NodeStateRepository>,
}

impl PersistenceGateway {
    /// Combine the two repositories
    pub fn new(
        instances: Arc<dyn FlowInstanceRepository>,
        nodes: Arc<dyn NodeStateRepository>,
    ) -> Self {
        Self { instances, nodes }
    }

    /// Durably record an instance
    pub async fn save_flow_instance(&self, instance: &FlowInstance) -> Result<(), CoreError> {
        self.instances.save(instance).await
    }

    /// Durably record a node execution
    pub async fn save_node_state(&self, state: &NodeState) -> Result<(), CoreError> {
        self.nodes.save(state).await
    }

    /// In-flight instances, used by startup recovery
    pub async fn load_active_instances(&self) -> Result<Vec<FlowInstance>, CoreError> {
        self.instances.find_active().await
    }

    /// Last persisted state of an instance
    pub async fn load_instance(&self, id: &FlowInstanceId) -> Result<Option<FlowInstance>, CoreError> {
        self.instances.find_by_id(id).await
    }

    /// Node execution history of an instance
    pub async fn load_node_states(&self, id: &FlowInstanceId) -> Result<Vec<NodeState>, CoreError> {
        self.nodes.find_for_flow(id).await
    }

    /// Instances for a business entity
    pub async fn load_instances_for_biz(&self, biz_id: &str) -> Result<Vec<FlowInstance>, CoreError> {
        self.instances.find_by_biz_id(biz_id).await
    }
}
