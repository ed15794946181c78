use crate::{
    domain::events::{
        DomainEvent, FlowInstanceCanceled, FlowInstanceCompleted, FlowInstanceCreated,
        FlowInstanceFailed, FlowInstanceStarted,
    },
    domain::flow_context::FlowContext,
    CoreError,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Flow instance status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowStatus {
    /// Created and persisted, first node not started
    Init,

    /// Node chain is running or parked at a polling node
    Processing,

    /// Reached a terminal node on the success path
    Success,

    /// Ended on the failure path
    Failed,

    /// Aborted before it started
    Canceled,
}

impl FlowStatus {
    /// No further node executes once an instance is in a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FlowStatus::Success | FlowStatus::Failed | FlowStatus::Canceled
        )
    }

    /// Stable storage label
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowStatus::Init => "Init",
            FlowStatus::Processing => "Processing",
            FlowStatus::Success => "Success",
            FlowStatus::Failed => "Failed",
            FlowStatus::Canceled => "Canceled",
        }
    }
}

/// Value object: Flow Instance ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowInstanceId(pub String);

impl FlowInstanceId {
    /// Generate a fresh id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for FlowInstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Aggregate: one running or finished instantiation of a flow template
#[derive(Debug, Serialize, Deserialize)]
pub struct FlowInstance {
    /// Unique identifier
    pub id: FlowInstanceId,

    /// Template this instance runs
    pub template_name: String,

    /// Business entity the instance acts on, e.g. a cluster id
    pub biz_id: String,

    /// Node being executed, or the node the instance ended at
    pub current_node: String,

    /// Current status
    pub status: FlowStatus,

    /// Values passed between nodes
    pub context: FlowContext,

    /// Attempts made at `current_node`
    pub current_attempt: u32,

    /// When `current_node` was entered; polling deadlines count from here
    pub node_entered_at: DateTime<Utc>,

    /// Set once an `on_failure` edge has been followed
    pub failure_path: bool,

    /// Most recent node failure
    pub last_error: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,

    /// Domain events
    #[serde(skip)]
    pub events: Vec<Box<dyn DomainEvent>>,
}

// Domain events are not cloned
impl Clone for FlowInstance {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            template_name: self.template_name.clone(),
            biz_id: self.biz_id.clone(),
            current_node: self.current_node.clone(),
            status: self.status,
            context: self.context.clone(),
            current_attempt: self.current_attempt,
            node_entered_at: self.node_entered_at,
            failure_path: self.failure_path,
            last_error: self.last_error.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            events: Vec::new(),
        }
    }
}

impl FlowInstance {
    /// Create an instance positioned at the template's start node
    pub fn new(
        template_name: impl Into<String>,
        biz_id: impl Into<String>,
        start_node: impl Into<String>,
        context: FlowContext,
    ) -> Self {
        let id = FlowInstanceId::generate();
        let now = Utc::now();
        let template_name = template_name.into();
        let biz_id = biz_id.into();

        let mut instance = Self {
            id: id.clone(),
            template_name: template_name.clone(),
            biz_id: biz_id.clone(),
            current_node: start_node.into(),
            status: FlowStatus::Init,
            context,
            current_attempt: 0,
            node_entered_at: now,
            failure_path: false,
            last_error: None,
            created_at: now,
            updated_at: now,
            events: Vec::with_capacity(8),
        };

        instance.record_event(Box::new(FlowInstanceCreated {
            flow_instance_id: id,
            template_name,
            biz_id,
            timestamp: now,
        }));

        instance
    }

    /// Move from `Init` to `Processing`
    pub fn start(&mut self) -> Result<(), CoreError> {
        if self.status != FlowStatus::Init {
            return Err(CoreError::InvalidTransition(format!(
                "Cannot start flow in state: {:?}",
                self.status
            )));
        }

        self.status = FlowStatus::Processing;
        self.node_entered_at = Utc::now();
        self.update_timestamp();

        self.record_event(Box::new(FlowInstanceStarted {
            flow_instance_id: self.id.clone(),
            timestamp: Utc::now(),
        }));

        Ok(())
    }

    /// Move to the next node, resetting per-node bookkeeping
    pub fn advance_to(&mut self, node: impl Into<String>) -> Result<(), CoreError> {
        if self.status != FlowStatus::Processing {
            return Err(CoreError::InvalidTransition(format!(
                "Cannot advance flow in state: {:?}",
                self.status
            )));
        }

        self.current_node = node.into();
        self.current_attempt = 0;
        self.node_entered_at = Utc::now();
        self.update_timestamp();
        Ok(())
    }

    /// Note that the failure edge was taken
    pub fn enter_failure_path(&mut self, error: impl Into<String>) {
        self.failure_path = true;
        self.last_error = Some(error.into());
        self.update_timestamp();
    }

    /// Complete the flow successfully at the current node
    pub fn complete(&mut self) -> Result<(), CoreError> {
        if self.status != FlowStatus::Processing {
            return Err(CoreError::InvalidTransition(format!(
                "Cannot complete flow in state: {:?}",
                self.status
            )));
        }

        self.status = FlowStatus::Success;
        self.update_timestamp();

        self.record_event(Box::new(FlowInstanceCompleted {
            flow_instance_id: self.id.clone(),
            final_node: self.current_node.clone(),
            timestamp: Utc::now(),
        }));

        Ok(())
    }

    /// End the flow as failed, pinned at the current node
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), CoreError> {
        if self.status != FlowStatus::Processing {
            return Err(CoreError::InvalidTransition(format!(
                "Cannot fail flow in state: {:?}",
                self.status
            )));
        }

        let error = error.into();
        self.status = FlowStatus::Failed;
        self.last_error = Some(error.clone());
        self.update_timestamp();

        self.record_event(Box::new(FlowInstanceFailed {
            flow_instance_id: self.id.clone(),
            final_node: self.current_node.clone(),
            error,
            timestamp: Utc::now(),
        }));

        Ok(())
    }

    /// Cancel an instance that never started
    pub fn cancel(&mut self, reason: impl Into<String>) -> Result<(), CoreError> {
        if self.status != FlowStatus::Init {
            return Err(CoreError::InvalidTransition(format!(
                "Cannot cancel flow in state: {:?}",
                self.status
            )));
        }

        let reason = reason.into();
        self.status = FlowStatus::Canceled;
        self.last_error = Some(reason.clone());
        self.update_timestamp();

        self.record_event(Box::new(FlowInstanceCanceled {
            flow_instance_id: self.id.clone(),
            reason,
            timestamp: Utc::now(),
        }));

        Ok(())
    }

    /// Whether no further node will execute
    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Update the timestamp
    #[inline]
    pub fn update_timestamp(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Record a domain event
    pub fn record_event(&mut self, event: Box<dyn DomainEvent>) {
        self.events.push(event);
    }

    /// Get and clear all domain events
    pub fn take_events(&mut self) -> Vec<Box<dyn DomainEvent>> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn instance() -> FlowInstance {
        let mut ctx = FlowContext::new();
        ctx.set("cluster_id", json!("c-1"));
        FlowInstance::new("ScaleOutCluster", "c-1", "start", ctx)
    }

    #[test]
    fn test_creation() {
        let mut instance = instance();

        assert_eq!(instance.status, FlowStatus::Init);
        assert_eq!(instance.current_node, "start");
        assert_eq!(instance.biz_id, "c-1");
        assert_eq!(instance.current_attempt, 0);
        assert!(!instance.failure_path);
        assert!(!instance.id.0.is_empty());

        let events = instance.take_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), "flow_instance.created");
        assert!(instance.take_events().is_empty());
    }

    #[test]
    fn test_success_lifecycle() {
        let mut instance = instance();
        instance.start().unwrap();
        assert_eq!(instance.status, FlowStatus::Processing);

        instance.current_attempt = 2;
        instance.advance_to("finish").unwrap();
        assert_eq!(instance.current_node, "finish");
        assert_eq!(instance.current_attempt, 0);

        instance.complete().unwrap();
        assert_eq!(instance.status, FlowStatus::Success);
        assert!(instance.is_terminal());
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut instance = instance();
        instance.start().unwrap();
        instance.fail("resource insufficient").unwrap();

        assert_eq!(instance.status, FlowStatus::Failed);
        assert_eq!(instance.last_error.as_deref(), Some("resource insufficient"));
        assert!(instance.advance_to("other").is_err());
        assert!(instance.complete().is_err());
        assert!(instance.fail("again").is_err());
        assert!(instance.start().is_err());
    }

    #[test]
    fn test_cancel_only_before_start() {
        let mut fresh = instance();
        fresh.cancel("operator abort").unwrap();
        assert_eq!(fresh.status, FlowStatus::Canceled);
        assert!(fresh.is_terminal());

        let mut running = instance();
        running.start().unwrap();
        assert!(matches!(
            running.cancel("too late"),
            Err(CoreError::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_clone_drops_events() {
        let original = instance();
        let copy = original.clone();
        assert_eq!(original.events.len(), 1);
        assert!(copy.events.is_empty());
        assert_eq!(copy.id, original.id);
        assert_eq!(copy.context, original.context);
    }

    #[test]
    fn test_serialization_round_trip() {
        let mut instance = instance();
        instance.start().unwrap();
        instance.enter_failure_path("deploy failed");

        let value = serde_json::to_value(&instance).unwrap();
        assert_eq!(value["status"], json!("Processing"));
        assert_eq!(value["context"]["cluster_id"], json!("c-1"));

        let back: FlowInstance = serde_json::from_value(value).unwrap();
        assert_eq!(back.id, instance.id);
        assert!(back.failure_path);
        assert_eq!(back.last_error.as_deref(), Some("deploy failed"));
        assert!(back.events.is_empty());
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(FlowStatus::Processing.as_str(), "Processing");
        assert!(!FlowStatus::Init.is_terminal());
        assert!(FlowStatus::Canceled.is_terminal());
    }
}
