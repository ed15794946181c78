//! In-memory state store for the clusterflow engine
//!
//! Implements the persistence gateway traits from clusterflow-core over
//! shared maps. Useful for development and tests; nothing survives the
//! process, so restart recovery needs the SQLite store instead.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub mod repositories;
pub use repositories::{InMemoryFlowInstanceRepository, InMemoryNodeStateRepository};

use clusterflow_core::{
    FlowInstance, FlowInstanceRepository, NodeState, NodeStateRepository, PersistenceGateway,
};

/// Provider for in-memory repositories sharing one set of maps
#[derive(Clone, Default)]
pub struct InMemoryStateStoreProvider {
    flow_instances: Arc<RwLock<HashMap<String, FlowInstance>>>,
    node_states: Arc<RwLock<HashMap<String, Vec<NodeState>>>>,
}

impl InMemoryStateStoreProvider {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create repositories backed by this store
    pub fn create_repositories(
        &self,
    ) -> (Arc<dyn FlowInstanceRepository>, Arc<dyn NodeStateRepository>) {
        let flow_instance_repo = Arc::new(InMemoryFlowInstanceRepository::new(
            self.flow_instances.clone(),
        ));
        let node_state_repo = Arc::new(InMemoryNodeStateRepository::new(self.node_states.clone()));

        (flow_instance_repo, node_state_repo)
    }

    /// Gateway over this store
    pub fn gateway(&self) -> PersistenceGateway {
        let (instances, nodes) = self.create_repositories();
        PersistenceGateway::new(instances, nodes)
    }
}
