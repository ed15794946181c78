//!
//! Clusterflow Core - workflow orchestration engine
//!
//! Defines flow templates, runs flow instances node by node, parks polling
//! nodes until their external work completes, and persists every transition
//! through the persistence gateway traits.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Domain layer - templates, instances, context, repositories
pub mod domain;

/// Application services - registry, runtime, scheduler, engine
pub mod application;

/// Engine configuration
pub mod config;

/// Error types
pub mod error;

pub use config::EngineConfig;
pub use error::CoreError;

pub use application::engine::FlowEngine;
pub use application::polling::{PollKey, PollingQueue, PollingScheduler};
pub use application::registry::FlowRegistry;
pub use application::runtime::{DriveOutcome, FlowRuntime, RecoveryReport};

pub use domain::collaborators::{
    AllocationResult, ComponentDemand, DistributionItem, HostAssignment, OperationExecutor,
    OperationHandle, OperationKind, OperationParams, OperationStatus, ResourceAllocator,
    TopologyDemand,
};
pub use domain::events::{DomainEvent, DomainEventHandler, LoggingEventHandler};
pub use domain::flow_context::{ContextKey, FlowContext};
pub use domain::flow_instance::{FlowInstance, FlowInstanceId, FlowStatus};
pub use domain::flow_template::{
    ExecutionMode, FlowTemplate, FlowTemplateBuilder, NodeDefinition, NodeExecutor, NodeOutcome,
    NoopExecutor, PollingPolicy,
};
pub use domain::node_state::{FailureKind, NodeState, NodeStatus};
pub use domain::repository::{FlowInstanceRepository, NodeStateRepository, PersistenceGateway};
