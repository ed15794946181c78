use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Debug;
use tracing::{debug, info, warn};

use crate::domain::flow_instance::FlowInstanceId;
use crate::CoreError;

/// Domain event trait for all events in the system
pub trait DomainEvent: Debug + Send + Sync {
    /// Returns the type of the event as a string
    fn event_type(&self) -> &'static str;

    /// Returns the flow instance ID this event is associated with
    fn flow_instance_id(&self) -> &FlowInstanceId;

    /// Returns the timestamp when the event occurred
    fn timestamp(&self) -> DateTime<Utc>;
}

/// Receives events after the transition that raised them is persisted
#[async_trait]
pub trait DomainEventHandler: Send + Sync {
    /// Handle a domain event
    async fn handle_event(&self, event: Box<dyn DomainEvent>) -> Result<(), CoreError>;
}

/// Event: Flow instance created
#[derive(Debug)]
pub struct FlowInstanceCreated {
    /// The unique identifier of the flow instance
    pub flow_instance_id: FlowInstanceId,

    /// Template the instance runs
    pub template_name: String,

    /// Business entity the instance acts on
    pub biz_id: String,

    /// The timestamp when the flow instance was created
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent for FlowInstanceCreated {
    fn event_type(&self) -> &'static str {
        "flow_instance.created"
    }

    fn flow_instance_id(&self) -> &FlowInstanceId {
        &self.flow_instance_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Event: Flow instance entered `Processing`
#[derive(Debug)]
pub struct FlowInstanceStarted {
    /// The unique identifier of the flow instance
    pub flow_instance_id: FlowInstanceId,

    /// The timestamp when the flow instance started
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent for FlowInstanceStarted {
    fn event_type(&self) -> &'static str {
        "flow_instance.started"
    }

    fn flow_instance_id(&self) -> &FlowInstanceId {
        &self.flow_instance_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Event: Node resolved successfully
#[derive(Debug)]
pub struct NodeSucceeded {
    /// The unique identifier of the flow instance
    pub flow_instance_id: FlowInstanceId,

    /// Node name
    pub node_name: String,

    /// Attempt that resolved the node
    pub attempt: u32,

    /// The timestamp when the node resolved
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent for NodeSucceeded {
    fn event_type(&self) -> &'static str {
        "node.succeeded"
    }

    fn flow_instance_id(&self) -> &FlowInstanceId {
        &self.flow_instance_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Event: Node resolved as failed
#[derive(Debug)]
pub struct NodeFailed {
    /// The unique identifier of the flow instance
    pub flow_instance_id: FlowInstanceId,

    /// Node name
    pub node_name: String,

    /// Attempt that resolved the node
    pub attempt: u32,

    /// Failure reason
    pub reason: String,

    /// The timestamp when the node failed
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent for NodeFailed {
    fn event_type(&self) -> &'static str {
        "node.failed"
    }

    fn flow_instance_id(&self) -> &FlowInstanceId {
        &self.flow_instance_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Event: Polling node is waiting on external work
#[derive(Debug)]
pub struct NodeSuspended {
    /// The unique identifier of the flow instance
    pub flow_instance_id: FlowInstanceId,

    /// Node name
    pub node_name: String,

    /// Attempt that came back pending
    pub attempt: u32,

    /// The timestamp when the node was suspended
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent for NodeSuspended {
    fn event_type(&self) -> &'static str {
        "node.suspended"
    }

    fn flow_instance_id(&self) -> &FlowInstanceId {
        &self.flow_instance_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Event: Flow instance completed successfully
#[derive(Debug)]
pub struct FlowInstanceCompleted {
    /// The unique identifier of the flow instance
    pub flow_instance_id: FlowInstanceId,

    /// Node the instance ended at
    pub final_node: String,

    /// The timestamp when the flow instance completed
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent for FlowInstanceCompleted {
    fn event_type(&self) -> &'static str {
        "flow_instance.completed"
    }

    fn flow_instance_id(&self) -> &FlowInstanceId {
        &self.flow_instance_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Event: Flow instance failed
#[derive(Debug)]
pub struct FlowInstanceFailed {
    /// The unique identifier of the flow instance
    pub flow_instance_id: FlowInstanceId,

    /// Node the instance ended at
    pub final_node: String,

    /// The error message
    pub error: String,

    /// The timestamp when the flow instance failed
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent for FlowInstanceFailed {
    fn event_type(&self) -> &'static str {
        "flow_instance.failed"
    }

    fn flow_instance_id(&self) -> &FlowInstanceId {
        &self.flow_instance_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Event: Flow instance canceled before it started
#[derive(Debug)]
pub struct FlowInstanceCanceled {
    /// The unique identifier of the flow instance
    pub flow_instance_id: FlowInstanceId,

    /// Cancellation reason
    pub reason: String,

    /// The timestamp when the flow instance was canceled
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent for FlowInstanceCanceled {
    fn event_type(&self) -> &'static str {
        "flow_instance.canceled"
    }

    fn flow_instance_id(&self) -> &FlowInstanceId {
        &self.flow_instance_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Default handler: writes every event to the log
#[derive(Debug, Default, Clone)]
pub struct LoggingEventHandler;

#[async_trait]
impl DomainEventHandler for LoggingEventHandler {
    async fn handle_event(&self, event: Box<dyn DomainEvent>) -> Result<(), CoreError> {
        match event.event_type() {
            "flow_instance.failed" => warn!(
                flow_id = %event.flow_instance_id(),
                event = ?event,
                "Flow instance failed"
            ),
            "flow_instance.completed" | "flow_instance.canceled" => info!(
                flow_id = %event.flow_instance_id(),
                event_type = event.event_type(),
                "Flow instance finished"
            ),
            event_type => debug!(
                flow_id = %event.flow_instance_id(),
                event_type,
                "Domain event"
            ),
        }
        Ok(())
    }
}
