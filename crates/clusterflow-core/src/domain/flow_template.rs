//! Flow templates: immutable node graphs loaded at startup.
//!
//! Each node names the node to follow on success and on failure. A node with
//! neither edge is terminal. Templates are validated when built and again on
//! registration, so a dangling edge stops the process before any instance runs.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::domain::flow_context::FlowContext;
use crate::domain::node_state::NodeState;
use crate::CoreError;

/// How a node's executor is driven
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Runs to completion; the chain continues without yielding
    Immediate,

    /// Starts or checks external work; may return `Pending` and be re-invoked
    Polling,
}

/// Re-invocation budget for a polling node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollingPolicy {
    /// Attempts before a synthetic failure; engine default when `None`
    pub max_attempts: Option<u32>,

    /// Time allowed since the node was entered; engine default when `None`
    pub deadline: Option<Duration>,

    /// Delay between attempts; engine default when `None`
    pub interval: Option<Duration>,
}

impl PollingPolicy {
    /// Policy bounded by an attempt count
    pub fn max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: Some(attempts),
            ..Self::default()
        }
    }

    /// Add a deadline
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Add a poll interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }
}

/// Signal returned by a node executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeOutcome {
    /// Follow `on_success`
    Success,

    /// Deliberate business failure; follow `on_failure`
    Failed(String),

    /// External work still running; polling nodes only
    Pending,
}

/// One step's behavior
///
/// Polling executors are invoked once per attempt and must tolerate being
/// re-invoked with the same attempt context after a restart. Values that
/// later nodes need go into the flow context.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    /// Run the step
    async fn run(&self, node: &mut NodeState, ctx: &mut FlowContext) -> Result<NodeOutcome, CoreError>;
}

/// Executor that always succeeds; the default for terminal nodes
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopExecutor;

#[async_trait]
impl NodeExecutor for NoopExecutor {
    async fn run(&self, _node: &mut NodeState, _ctx: &mut FlowContext) -> Result<NodeOutcome, CoreError> {
        Ok(NodeOutcome::Success)
    }
}

/// A node in a flow template
#[derive(Clone)]
pub struct NodeDefinition {
    /// Node name, unique within the template
    pub name: String,

    /// Next node after success
    pub on_success: Option<String>,

    /// Next node after failure
    pub on_failure: Option<String>,

    /// Execution mode
    pub mode: ExecutionMode,

    /// Polling budget; ignored for immediate nodes
    pub polling: PollingPolicy,

    /// Step behavior
    pub executor: Arc<dyn NodeExecutor>,
}

impl fmt::Debug for NodeDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeDefinition")
            .field("name", &self.name)
            .field("on_success", &self.on_success)
            .field("on_failure", &self.on_failure)
            .field("mode", &self.mode)
            .field("polling", &self.polling)
            .finish_non_exhaustive()
    }
}

impl NodeDefinition {
    /// Immediate node
    pub fn immediate(
        name: impl Into<String>,
        on_success: &str,
        on_failure: &str,
        executor: Arc<dyn NodeExecutor>,
    ) -> Self {
        Self {
            name: name.into(),
            on_success: edge(on_success),
            on_failure: edge(on_failure),
            mode: ExecutionMode::Immediate,
            polling: PollingPolicy::default(),
            executor,
        }
    }

    /// Polling node
    pub fn polling(
        name: impl Into<String>,
        on_success: &str,
        on_failure: &str,
        policy: PollingPolicy,
        executor: Arc<dyn NodeExecutor>,
    ) -> Self {
        Self {
            name: name.into(),
            on_success: edge(on_success),
            on_failure: edge(on_failure),
            mode: ExecutionMode::Polling,
            polling: policy,
            executor,
        }
    }

    /// Terminal node running the given executor
    pub fn terminal(name: impl Into<String>, executor: Arc<dyn NodeExecutor>) -> Self {
        Self::immediate(name, "", "", executor)
    }

    /// Node with no edges
    pub fn is_terminal(&self) -> bool {
        self.on_success.is_none() && self.on_failure.is_none()
    }

    /// Edge selected by an outcome
    pub fn next(&self, succeeded: bool) -> Option<&str> {
        if succeeded {
            self.on_success.as_deref()
        } else {
            self.on_failure.as_deref()
        }
    }
}

fn edge(target: &str) -> Option<String> {
    if target.is_empty() {
        None
    } else {
        Some(target.to_string())
    }
}

/// A validated node graph
#[derive(Debug, Clone)]
pub struct FlowTemplate {
    name: String,
    start: String,
    status_alias: Option<String>,
    nodes: HashMap<String, NodeDefinition>,
}

impl FlowTemplate {
    /// Start building a template
    pub fn builder(name: impl Into<String>) -> FlowTemplateBuilder {
        FlowTemplateBuilder {
            name: name.into(),
            start: None,
            status_alias: None,
            nodes: Vec::new(),
        }
    }

    /// Template name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Designated start node
    pub fn start_node(&self) -> &str {
        &self.start
    }

    /// Label the owning entity carries while an instance runs, e.g. `Creating`
    pub fn status_alias(&self) -> Option<&str> {
        self.status_alias.as_deref()
    }

    /// Look up a node
    pub fn node(&self, name: &str) -> Option<&NodeDefinition> {
        self.nodes.get(name)
    }

    /// All nodes, in no particular order
    pub fn nodes(&self) -> impl Iterator<Item = &NodeDefinition> {
        self.nodes.values()
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the template has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Check the graph invariants
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.name.trim().is_empty() {
            return Err(CoreError::InvalidTemplate("template name is empty".to_string()));
        }

        if self.nodes.is_empty() {
            return Err(CoreError::InvalidTemplate(format!(
                "template '{}' has no nodes",
                self.name
            )));
        }

        if !self.nodes.contains_key(&self.start) {
            return Err(CoreError::InvalidTemplate(format!(
                "template '{}' start node '{}' does not exist",
                self.name, self.start
            )));
        }

        for (key, node) in &self.nodes {
            if key != &node.name {
                return Err(CoreError::InvalidTemplate(format!(
                    "template '{}' node key '{}' does not match node name '{}'",
                    self.name, key, node.name
                )));
            }

            for (label, target) in [("on_success", &node.on_success), ("on_failure", &node.on_failure)] {
                if let Some(target) = target {
                    if !self.nodes.contains_key(target) {
                        return Err(CoreError::InvalidTemplate(format!(
                            "template '{}' node '{}' {} target '{}' does not exist",
                            self.name, node.name, label, target
                        )));
                    }
                }
            }

            if node.mode == ExecutionMode::Polling && node.polling.max_attempts == Some(0) {
                return Err(CoreError::InvalidTemplate(format!(
                    "template '{}' polling node '{}' allows zero attempts",
                    self.name, node.name
                )));
            }
        }

        let reachable = self.reachable_from_start();
        for name in self.nodes.keys().filter(|name| !reachable.contains(name.as_str())) {
            warn!(template = %self.name, node = %name, "Node is unreachable from the start node");
        }

        Ok(())
    }

    fn reachable_from_start(&self) -> HashSet<&str> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([self.start.as_str()]);

        while let Some(name) = queue.pop_front() {
            if !seen.insert(name) {
                continue;
            }
            if let Some(node) = self.nodes.get(name) {
                queue.extend(node.on_success.as_deref());
                queue.extend(node.on_failure.as_deref());
            }
        }

        seen
    }
}

/// Builder for [`FlowTemplate`]
///
/// The first node added is the start node unless [`start`](Self::start)
/// names another.
pub struct FlowTemplateBuilder {
    name: String,
    start: Option<String>,
    status_alias: Option<String>,
    nodes: Vec<NodeDefinition>,
}

impl FlowTemplateBuilder {
    /// Designate the start node
    pub fn start(mut self, node: impl Into<String>) -> Self {
        self.start = Some(node.into());
        self
    }

    /// Set the status label shown while an instance runs
    pub fn status_alias(mut self, alias: impl Into<String>) -> Self {
        self.status_alias = Some(alias.into());
        self
    }

    /// Add a node definition
    pub fn node(mut self, node: NodeDefinition) -> Self {
        self.nodes.push(node);
        self
    }

    /// Add an immediate node; an empty edge means "none"
    pub fn immediate(
        self,
        name: impl Into<String>,
        on_success: &str,
        on_failure: &str,
        executor: Arc<dyn NodeExecutor>,
    ) -> Self {
        self.node(NodeDefinition::immediate(name, on_success, on_failure, executor))
    }

    /// Add a polling node; an empty edge means "none"
    pub fn polling(
        self,
        name: impl Into<String>,
        on_success: &str,
        on_failure: &str,
        policy: PollingPolicy,
        executor: Arc<dyn NodeExecutor>,
    ) -> Self {
        self.node(NodeDefinition::polling(name, on_success, on_failure, policy, executor))
    }

    /// Add a terminal node with its own executor
    pub fn terminal(self, name: impl Into<String>, executor: Arc<dyn NodeExecutor>) -> Self {
        self.node(NodeDefinition::terminal(name, executor))
    }

    /// Add a terminal node that does nothing
    pub fn end(self, name: impl Into<String>) -> Self {
        self.terminal(name, Arc::new(NoopExecutor))
    }

    /// Validate and build
    pub fn build(self) -> Result<FlowTemplate, CoreError> {
        let start = match self.start.or_else(|| self.nodes.first().map(|n| n.name.clone())) {
            Some(start) => start,
            None => {
                return Err(CoreError::InvalidTemplate(format!(
                    "template '{}' has no nodes",
                    self.name
                )))
            }
        };

        let mut nodes = HashMap::with_capacity(self.nodes.len());
        for node in self.nodes {
            if nodes.contains_key(&node.name) {
                return Err(CoreError::InvalidTemplate(format!(
                    "template '{}' defines node '{}' more than once",
                    self.name, node.name
                )));
            }
            nodes.insert(node.name.clone(), node);
        }

        let template = FlowTemplate {
            name: self.name,
            start,
            status_alias: self.status_alias,
            nodes,
        };
        template.validate()?;
        Ok(template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Arc<dyn NodeExecutor> {
        Arc::new(NoopExecutor)
    }

    fn scenario_template() -> Result<FlowTemplate, CoreError> {
        FlowTemplate::builder("Provision")
            .immediate("start", "finish", "fail", noop())
            .end("finish")
            .end("fail")
            .build()
    }

    #[test]
    fn test_build_valid_template() {
        let template = scenario_template().unwrap();

        assert_eq!(template.name(), "Provision");
        assert_eq!(template.start_node(), "start");
        assert_eq!(template.len(), 3);

        let start = template.node("start").unwrap();
        assert_eq!(start.next(true), Some("finish"));
        assert_eq!(start.next(false), Some("fail"));
        assert!(!start.is_terminal());
        assert!(template.node("finish").unwrap().is_terminal());
    }

    #[test]
    fn test_explicit_start_node() {
        let template = FlowTemplate::builder("Delete")
            .end("end")
            .immediate("destroy", "end", "", noop())
            .start("destroy")
            .build()
            .unwrap();
        assert_eq!(template.start_node(), "destroy");
    }

    #[test]
    fn test_dangling_success_target() {
        let err = FlowTemplate::builder("Broken")
            .immediate("start", "finish", "", noop())
            .build()
            .unwrap_err();

        match err {
            CoreError::InvalidTemplate(msg) => {
                assert!(msg.contains("on_success"));
                assert!(msg.contains("finish"));
            }
            other => panic!("Expected InvalidTemplate, got {:?}", other),
        }
    }

    #[test]
    fn test_dangling_failure_target() {
        let err = FlowTemplate::builder("Broken")
            .immediate("start", "end", "cleanup", noop())
            .end("end")
            .build()
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidTemplate(msg) if msg.contains("cleanup")));
    }

    #[test]
    fn test_missing_start_node() {
        let err = FlowTemplate::builder("Broken")
            .end("end")
            .start("start")
            .build()
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidTemplate(msg) if msg.contains("start node")));
    }

    #[test]
    fn test_empty_template() {
        let err = FlowTemplate::builder("Empty").build().unwrap_err();
        assert!(matches!(err, CoreError::InvalidTemplate(_)));
    }

    #[test]
    fn test_duplicate_node() {
        let err = FlowTemplate::builder("Dup")
            .end("end")
            .end("end")
            .build()
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidTemplate(msg) if msg.contains("more than once")));
    }

    #[test]
    fn test_zero_attempt_polling_node() {
        let err = FlowTemplate::builder("Poll")
            .polling("deploy", "end", "", PollingPolicy::max_attempts(0), noop())
            .end("end")
            .build()
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidTemplate(msg) if msg.contains("zero attempts")));
    }

    #[test]
    fn test_cycles_are_allowed() {
        let template = FlowTemplate::builder("Retry")
            .immediate("check", "end", "wait", noop())
            .polling("wait", "check", "end", PollingPolicy::max_attempts(5), noop())
            .end("end")
            .build();
        assert!(template.is_ok());
    }

    #[test]
    fn test_status_alias() {
        let template = FlowTemplate::builder("Backup")
            .status_alias("BackingUp")
            .end("end")
            .build()
            .unwrap();
        assert_eq!(template.status_alias(), Some("BackingUp"));
        assert_eq!(scenario_template().unwrap().status_alias(), None);
    }

    #[test]
    fn test_polling_policy_helpers() {
        let policy = PollingPolicy::max_attempts(3)
            .with_deadline(Duration::from_secs(600))
            .with_interval(Duration::from_millis(50));
        assert_eq!(policy.max_attempts, Some(3));
        assert_eq!(policy.deadline, Some(Duration::from_secs(600)));
        assert_eq!(policy.interval, Some(Duration::from_millis(50)));
    }

    #[tokio::test]
    async fn test_noop_executor_succeeds() {
        let mut node = NodeState::new(
            crate::domain::flow_instance::FlowInstanceId("f".to_string()),
            "end",
            1,
        );
        let mut ctx = FlowContext::new();
        assert_eq!(NoopExecutor.run(&mut node, &mut ctx).await.unwrap(), NodeOutcome::Success);
    }
}
