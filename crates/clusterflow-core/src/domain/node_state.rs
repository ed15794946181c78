use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::flow_instance::FlowInstanceId;
use crate::CoreError;

/// Status of one node execution attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatus {
    /// Record created, executor not yet invoked
    Init,

    /// Executor running, or a polling attempt that is still pending
    Processing,

    /// Node resolved successfully
    Success,

    /// Node resolved as failed
    Fail,
}

/// Why a node ended in `Fail`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// Executor returned a deliberate failure outcome
    Business,

    /// Executor raised an error or panicked
    ExecutorError,

    /// Polling budget (attempts or deadline) ran out
    AttemptsExhausted,

    /// Failure forced from outside the engine
    Aborted,
}

/// One node execution record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeState {
    /// Record id
    pub id: String,

    /// Owning flow instance
    pub flow_id: FlowInstanceId,

    /// Node name within the template
    pub node_name: String,

    /// 1-based attempt number
    pub attempt: u32,

    /// Current status
    pub status: NodeStatus,

    /// Opaque payload set by the executor
    pub result: Option<Value>,

    /// Failure reason or last transient error
    pub error_message: Option<String>,

    /// Set when `status` is `Fail`
    pub failure: Option<FailureKind>,

    /// When the executor was invoked
    pub started_at: Option<DateTime<Utc>>,

    /// When the attempt ended
    pub finished_at: Option<DateTime<Utc>>,
}

impl NodeState {
    /// New record for an attempt
    pub fn new(flow_id: FlowInstanceId, node_name: impl Into<String>, attempt: u32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            flow_id,
            node_name: node_name.into(),
            attempt,
            status: NodeStatus::Init,
            result: None,
            error_message: None,
            failure: None,
            started_at: None,
            finished_at: None,
        }
    }

    /// Mark the attempt as running
    pub fn begin(&mut self) -> Result<(), CoreError> {
        if self.status != NodeStatus::Init {
            return Err(CoreError::InvalidTransition(format!(
                "Cannot begin node {} in state: {:?}",
                self.node_name, self.status
            )));
        }
        self.status = NodeStatus::Processing;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Resolve the node successfully
    pub fn succeed(&mut self) -> Result<(), CoreError> {
        if self.status != NodeStatus::Processing {
            return Err(CoreError::InvalidTransition(format!(
                "Cannot complete node {} in state: {:?}",
                self.node_name, self.status
            )));
        }
        self.status = NodeStatus::Success;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Resolve the node as failed
    pub fn fail(&mut self, kind: FailureKind, reason: impl Into<String>) -> Result<(), CoreError> {
        if self.is_resolved() {
            return Err(CoreError::InvalidTransition(format!(
                "Cannot fail node {} in state: {:?}",
                self.node_name, self.status
            )));
        }
        self.status = NodeStatus::Fail;
        self.failure = Some(kind);
        self.error_message = Some(reason.into());
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Close a polling attempt that is still waiting on external work
    pub fn suspend(&mut self) -> Result<(), CoreError> {
        if self.status != NodeStatus::Processing {
            return Err(CoreError::InvalidTransition(format!(
                "Cannot suspend node {} in state: {:?}",
                self.node_name, self.status
            )));
        }
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Whether the node reached `Success` or `Fail`
    pub fn is_resolved(&self) -> bool {
        matches!(self.status, NodeStatus::Success | NodeStatus::Fail)
    }
}
