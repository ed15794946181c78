use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::trace;

use clusterflow_core::{
    CoreError, FlowInstance, FlowInstanceId, FlowInstanceRepository, FlowStatus, NodeState,
    NodeStateRepository,
};

/// In-memory implementation of the FlowInstanceRepository
pub struct InMemoryFlowInstanceRepository {
    instances: Arc<RwLock<HashMap<String, FlowInstance>>>,
}

impl InMemoryFlowInstanceRepository {
    /// Create a new in-memory flow instance repository
    pub fn new(instances: Arc<RwLock<HashMap<String, FlowInstance>>>) -> Self {
        Self { instances }
    }
}

#[async_trait]
impl FlowInstanceRepository for InMemoryFlowInstanceRepository {
    async fn save(&self, instance: &FlowInstance) -> Result<(), CoreError> {
        trace!(flow_id = %instance.id, status = ?instance.status, "Saving flow instance");
        let mut instances = self.instances.write().await;
        instances.insert(instance.id.0.clone(), instance.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &FlowInstanceId) -> Result<Option<FlowInstance>, CoreError> {
        let instances = self.instances.read().await;
        Ok(instances.get(&id.0).cloned())
    }

    async fn find_active(&self) -> Result<Vec<FlowInstance>, CoreError> {
        let instances = self.instances.read().await;
        let mut active: Vec<FlowInstance> = instances
            .values()
            .filter(|instance| instance.status == FlowStatus::Processing)
            .cloned()
            .collect();
        active.sort_by_key(|instance| instance.created_at);
        Ok(active)
    }

    async fn find_by_biz_id(&self, biz_id: &str) -> Result<Vec<FlowInstance>, CoreError> {
        let instances = self.instances.read().await;
        let mut matching: Vec<FlowInstance> = instances
            .values()
            .filter(|instance| instance.biz_id == biz_id)
            .cloned()
            .collect();
        matching.sort_by_key(|instance| instance.created_at);
        Ok(matching)
    }
}

/// In-memory implementation of the NodeStateRepository
pub struct InMemoryNodeStateRepository {
    states: Arc<RwLock<HashMap<String, Vec<NodeState>>>>,
}

impl InMemoryNodeStateRepository {
    /// Create a new in-memory node state repository
    pub fn new(states: Arc<RwLock<HashMap<String, Vec<NodeState>>>>) -> Self {
        Self { states }
    }
}

#[async_trait]
impl NodeStateRepository for InMemoryNodeStateRepository {
    async fn save(&self, state: &NodeState) -> Result<(), CoreError> {
        let mut states = self.states.write().await;
        let history = states.entry(state.flow_id.0.clone()).or_default();

        match history.iter_mut().find(|existing| existing.id == state.id) {
            Some(existing) => *existing = state.clone(),
            None => history.push(state.clone()),
        }
        Ok(())
    }

    async fn find_for_flow(&self, flow_id: &FlowInstanceId) -> Result<Vec<NodeState>, CoreError> {
        let states = self.states.read().await;
        Ok(states.get(&flow_id.0).cloned().unwrap_or_default())
    }
}
