//! Engine builder for tests.

use clusterflow_core::{
    CoreError, DomainEventHandler, EngineConfig, FlowEngine, FlowRegistry, FlowRuntime,
    FlowTemplate, PersistenceGateway,
};
use clusterflow_state_inmemory::InMemoryStateStoreProvider;
use std::sync::Arc;

use crate::implementations::flaky_store::{FaultSwitch, FlakyFlowInstanceRepository, FlakyNodeStateRepository};
use crate::implementations::recording_events::RecordingEventHandler;

/// Configuration with no waiting anywhere
///
/// Pending nodes are due immediately, and persistence retries once without
/// backoff. Tests drive the scheduler with `poll_due` rather than `run`.
pub fn test_config() -> EngineConfig {
    EngineConfig {
        poll_interval_ms: 0,
        scan_interval_ms: 10,
        persist_retries: 1,
        persist_retry_backoff_ms: 0,
        ..EngineConfig::default()
    }
}

/// An engine over an in-memory store with fault injection and event capture
pub struct TestEngine {
    /// Engine under test
    pub engine: FlowEngine,

    /// Backing store; survives the engine for restart tests
    pub store: InMemoryStateStoreProvider,

    /// Save failure injection
    pub faults: Arc<FaultSwitch>,

    /// Save failure injection for flow instances only; node records still save
    pub instance_faults: Arc<FaultSwitch>,

    /// Captured domain events
    pub events: Arc<RecordingEventHandler>,
}

impl TestEngine {
    /// Build a fresh engine over the same store, as after a restart
    pub fn restart(&self, registry: FlowRegistry, config: EngineConfig) -> FlowEngine {
        let runtime = FlowRuntime::new(Arc::new(registry), self.store.gateway(), config)
            .with_event_handler(self.events.clone());
        FlowEngine::new(runtime)
    }
}

/// Builder for [`TestEngine`]
pub struct TestEngineBuilder {
    registry: FlowRegistry,
    config: EngineConfig,
    store: InMemoryStateStoreProvider,
}

impl Default for TestEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEngineBuilder {
    /// Start from an empty registry and [`test_config`]
    pub fn new() -> Self {
        Self {
            registry: FlowRegistry::new(),
            config: test_config(),
            store: InMemoryStateStoreProvider::new(),
        }
    }

    /// Register a template
    pub fn template(mut self, template: FlowTemplate) -> Result<Self, CoreError> {
        self.registry.register(template)?;
        Ok(self)
    }

    /// Use a prepared registry
    pub fn registry(mut self, registry: FlowRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Override the configuration
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Share an existing store
    pub fn store(mut self, store: InMemoryStateStoreProvider) -> Self {
        self.store = store;
        self
    }

    /// Build the engine
    pub fn build(self) -> TestEngine {
        let faults = FaultSwitch::new();
        let instance_faults = FaultSwitch::new();
        let events = Arc::new(RecordingEventHandler::new());

        let (instances, nodes) = self.store.create_repositories();
        let gateway = PersistenceGateway::new(
            Arc::new(
                FlakyFlowInstanceRepository::new(instances, faults.clone())
                    .with_switch(instance_faults.clone()),
            ),
            Arc::new(FlakyNodeStateRepository::new(nodes, faults.clone())),
        );

        let handler: Arc<dyn DomainEventHandler> = events.clone();
        let runtime = FlowRuntime::new(Arc::new(self.registry), gateway, self.config)
            .with_event_handler(handler);

        TestEngine {
            engine: FlowEngine::new(runtime),
            store: self.store,
            faults,
            instance_faults,
            events,
        }
    }
}
