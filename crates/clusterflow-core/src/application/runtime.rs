//! Node executor runtime.
//!
//! Drives flow instances from node to node. Every instance with work in
//! flight lives in a slot guarded by its own async mutex, which is held for
//! the whole execution of a node chain: one writer per instance, while
//! unrelated instances run in parallel.
//!
//! A node runs against a working copy of the instance. The copy is persisted
//! (node record first, then the instance) and only then becomes the
//! in-memory state. If persistence keeps failing the instance is halted:
//! it is dropped from memory, the durable copy stays the source of truth,
//! and [`FlowRuntime::resume_instance`] picks it up again later.

use chrono::Utc;
use dashmap::DashMap;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::application::polling::{PollKey, PollingQueue};
use crate::application::registry::FlowRegistry;
use crate::config::EngineConfig;
use crate::domain::events::{
    DomainEventHandler, LoggingEventHandler, NodeFailed, NodeSucceeded, NodeSuspended,
};
use crate::domain::flow_context::FlowContext;
use crate::domain::flow_instance::{FlowInstance, FlowInstanceId, FlowStatus};
use crate::domain::flow_template::{ExecutionMode, NodeDefinition, NodeOutcome};
use crate::domain::node_state::{FailureKind, NodeState};
use crate::domain::repository::PersistenceGateway;
use crate::CoreError;

type Slot = Arc<Mutex<FlowInstance>>;

/// Where a drive pass left an instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriveOutcome {
    /// Parked at a polling node
    Suspended {
        /// Polling node
        node: String,
    },

    /// Reached a terminal status
    Finished(FlowStatus),

    /// Request no longer matches the instance; nothing was executed
    Stale,
}

/// Result of startup recovery
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Instances re-armed at a polling node
    pub rearmed: usize,

    /// Instances re-driven from an immediate node
    pub resumed: usize,

    /// Instances left untouched
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Continue,
    Suspended,
    Terminated,
}

#[derive(Debug)]
enum Resolution {
    Succeeded,
    Failed { kind: FailureKind, reason: String },
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resumption {
    Rearmed,
    Resumed,
    Skipped,
}

/// Drives flow instances
pub struct FlowRuntime {
    registry: Arc<FlowRegistry>,
    gateway: PersistenceGateway,
    event_handler: Arc<dyn DomainEventHandler>,
    config: EngineConfig,
    queue: Arc<PollingQueue>,
    slots: DashMap<FlowInstanceId, Slot>,
    halted: DashMap<FlowInstanceId, String>,
}

impl FlowRuntime {
    /// Create a runtime that logs domain events
    pub fn new(registry: Arc<FlowRegistry>, gateway: PersistenceGateway, config: EngineConfig) -> Self {
        Self {
            registry,
            gateway,
            event_handler: Arc::new(LoggingEventHandler),
            config,
            queue: Arc::new(PollingQueue::new()),
            slots: DashMap::new(),
            halted: DashMap::new(),
        }
    }

    /// Replace the domain event handler
    pub fn with_event_handler(mut self, event_handler: Arc<dyn DomainEventHandler>) -> Self {
        self.event_handler = event_handler;
        self
    }

    /// Shared polling queue
    pub fn queue(&self) -> &Arc<PollingQueue> {
        &self.queue
    }

    /// Template registry
    pub fn registry(&self) -> &Arc<FlowRegistry> {
        &self.registry
    }

    /// Persistence gateway
    pub fn gateway(&self) -> &PersistenceGateway {
        &self.gateway
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Instances currently held in memory
    pub fn live_instances(&self) -> usize {
        self.slots.len()
    }

    /// Halted instances and the error that halted them
    pub fn halted_instances(&self) -> Vec<(FlowInstanceId, String)> {
        self.halted
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Whether an instance is halted
    pub fn is_halted(&self, id: &FlowInstanceId) -> bool {
        self.halted.contains_key(id)
    }

    /// Create and persist an instance in `Init` at the template's start node
    pub async fn create_instance(
        &self,
        template_name: &str,
        biz_id: &str,
        initial_context: FlowContext,
    ) -> Result<FlowInstanceId, CoreError> {
        let template = self.registry.lookup(template_name)?;
        let mut instance = FlowInstance::new(
            template.name(),
            biz_id,
            template.start_node(),
            initial_context,
        );
        let id = instance.id.clone();

        self.persist(&instance, None).await?;
        self.dispatch_events(&mut instance).await;

        info!(flow_id = %id, template = %template_name, biz_id, "Created flow instance");
        self.slots.insert(id.clone(), Arc::new(Mutex::new(instance)));
        Ok(id)
    }

    /// Move an instance to `Processing` and drive it on a background task
    pub async fn start(self: &Arc<Self>, id: &FlowInstanceId) -> Result<(), CoreError> {
        let slot = self.slot(id).await?;
        {
            let mut instance = slot.lock().await;
            let mut candidate = instance.clone();
            candidate.start()?;
            self.persist(&candidate, None).await?;
            *instance = candidate;
            self.dispatch_events(&mut instance).await;
            info!(flow_id = %id, node = %instance.current_node, "Started flow instance");
        }

        self.spawn_drive(id.clone());
        Ok(())
    }

    /// Drive an instance on a background task
    pub fn spawn_drive(self: &Arc<Self>, id: FlowInstanceId) {
        let runtime = Arc::clone(self);
        tokio::spawn(async move {
            match runtime.drive(&id).await {
                Ok(outcome) => debug!(flow_id = %id, ?outcome, "Drive pass finished"),
                Err(e) => error!(flow_id = %id, error = %e, "Flow execution error"),
            }
        });
    }

    /// Run the instance's current node and every node after it until the
    /// chain suspends or terminates
    ///
    /// Driving a terminal instance is a no-op.
    pub async fn drive(&self, id: &FlowInstanceId) -> Result<DriveOutcome, CoreError> {
        let slot = self.slot(id).await?;
        let mut instance = slot.lock().await;

        if instance.is_terminal() {
            self.release(id, &slot);
            return Ok(DriveOutcome::Finished(instance.status));
        }
        if !self.owns(id, &slot) {
            return Ok(DriveOutcome::Stale);
        }
        if instance.status == FlowStatus::Init {
            return Err(CoreError::InvalidTransition(format!(
                "Flow instance {} has not been started",
                id
            )));
        }

        self.queue
            .disarm(&PollKey::new(id.clone(), instance.current_node.clone()));
        self.run_chain(&mut instance).await
    }

    /// Make one more attempt at a parked polling node
    ///
    /// Entries that no longer match the instance (it moved on, finished, or
    /// was halted) are dropped without executing anything.
    pub async fn poll(&self, key: &PollKey) -> Result<DriveOutcome, CoreError> {
        let slot = match self.slot(&key.flow_id).await {
            Ok(slot) => slot,
            Err(CoreError::FlowInstanceNotFound(_)) | Err(CoreError::InstanceHalted(_)) => {
                return Ok(DriveOutcome::Stale)
            }
            Err(e) => return Err(e),
        };
        let mut instance = slot.lock().await;

        if instance.is_terminal() {
            self.release(&key.flow_id, &slot);
            return Ok(DriveOutcome::Stale);
        }
        if !self.owns(&key.flow_id, &slot)
            || instance.status != FlowStatus::Processing
            || instance.current_node != key.node_name
        {
            return Ok(DriveOutcome::Stale);
        }

        self.run_chain(&mut instance).await
    }

    /// Force the current node to fail and follow its failure edge
    ///
    /// Waits for any node of the instance that is already running. Cleanup
    /// nodes on the failure path run before this returns. An instance that
    /// was never started is canceled instead.
    pub async fn abort(&self, id: &FlowInstanceId, reason: &str) -> Result<DriveOutcome, CoreError> {
        let slot = self.slot(id).await?;
        let mut instance = slot.lock().await;

        if instance.is_terminal() {
            self.release(id, &slot);
            return Ok(DriveOutcome::Finished(instance.status));
        }
        if !self.owns(id, &slot) {
            return Ok(DriveOutcome::Stale);
        }

        self.queue
            .disarm(&PollKey::new(id.clone(), instance.current_node.clone()));

        if instance.status == FlowStatus::Init {
            let mut candidate = instance.clone();
            candidate.cancel(reason)?;
            if let Err(e) = self.persist(&candidate, None).await {
                self.halt(id, &e);
                return Err(e);
            }
            *instance = candidate;
            self.dispatch_events(&mut instance).await;
            self.slots.remove(id);
            info!(flow_id = %id, reason, "Canceled flow instance");
            return Ok(DriveOutcome::Finished(FlowStatus::Canceled));
        }

        let template = self.registry.lookup(&instance.template_name)?;
        let node = template.node(&instance.current_node).ok_or_else(|| {
            CoreError::InvalidTemplate(format!(
                "template '{}' has no node '{}'",
                template.name(),
                instance.current_node
            ))
        })?;

        warn!(flow_id = %id, node = %node.name, reason, "Aborting flow instance");

        let attempt = instance.current_attempt + 1;
        let mut candidate = instance.clone();
        candidate.current_attempt = attempt;
        let state = NodeState::new(id.clone(), node.name.clone(), attempt);
        let resolution = Resolution::Failed {
            kind: FailureKind::Aborted,
            reason: format!("aborted: {}", reason),
        };

        let step = self
            .commit(node, &mut instance, candidate, state, resolution)
            .await?;
        match self.after_step(step, &instance) {
            Some(outcome) => Ok(outcome),
            None => self.run_chain(&mut instance).await,
        }
    }

    /// Reload in-flight instances after a restart
    ///
    /// Instances parked at a polling node are re-armed as due now and keep
    /// their persisted attempt count. Instances at an immediate node are
    /// re-driven when `resume_immediate_on_recovery` is set.
    pub async fn recover(self: &Arc<Self>) -> Result<RecoveryReport, CoreError> {
        let active = self.gateway.load_active_instances().await?;
        info!(count = active.len(), "Recovering in-flight flow instances");

        let mut report = RecoveryReport::default();
        for mut instance in active {
            if self.slots.contains_key(&instance.id) {
                report.skipped += 1;
                continue;
            }
            self.reconcile_attempts(&mut instance).await?;
            match self.resume_loaded(instance) {
                Resumption::Rearmed => report.rearmed += 1,
                Resumption::Resumed => report.resumed += 1,
                Resumption::Skipped => report.skipped += 1,
            }
        }

        info!(
            rearmed = report.rearmed,
            resumed = report.resumed,
            skipped = report.skipped,
            "Recovery finished"
        );
        Ok(report)
    }

    /// Reload an instance from storage and continue it, e.g. after a halt
    pub async fn resume_instance(self: &Arc<Self>, id: &FlowInstanceId) -> Result<(), CoreError> {
        let mut instance = self
            .gateway
            .load_instance(id)
            .await?
            .ok_or_else(|| CoreError::FlowInstanceNotFound(id.to_string()))?;

        self.halted.remove(id);
        self.slots.remove(id);

        if instance.status != FlowStatus::Processing {
            debug!(flow_id = %id, status = ?instance.status, "Nothing to resume");
            return Ok(());
        }

        self.reconcile_attempts(&mut instance).await?;
        info!(flow_id = %id, node = %instance.current_node, "Resuming flow instance");
        self.resume_loaded(instance);
        Ok(())
    }

    /// Move the attempt counter past node records that were saved while the
    /// instance save itself was lost
    ///
    /// Only the trailing records of the current node count; records from an
    /// earlier visit to the same node started before `node_entered_at`.
    async fn reconcile_attempts(&self, instance: &mut FlowInstance) -> Result<(), CoreError> {
        let history = self.gateway.load_node_states(&instance.id).await?;
        let recorded = history
            .iter()
            .rev()
            .take_while(|state| state.node_name == instance.current_node)
            .filter(|state| {
                state
                    .started_at
                    .map_or(true, |started| started >= instance.node_entered_at)
            })
            .map(|state| state.attempt)
            .max();

        if let Some(attempt) = recorded.filter(|attempt| *attempt > instance.current_attempt) {
            warn!(
                flow_id = %instance.id,
                node = %instance.current_node,
                persisted = instance.current_attempt,
                recorded = attempt,
                "Instance is behind its node history, continuing after the recorded attempt"
            );
            instance.current_attempt = attempt;
        }
        Ok(())
    }

    fn resume_loaded(self: &Arc<Self>, instance: FlowInstance) -> Resumption {
        let id = instance.id.clone();

        let template = match self.registry.lookup(&instance.template_name) {
            Ok(template) => template,
            Err(e) => {
                error!(flow_id = %id, template = %instance.template_name, error = %e, "Cannot resume flow instance");
                return Resumption::Skipped;
            }
        };
        let mode = match template.node(&instance.current_node) {
            Some(node) => node.mode,
            None => {
                error!(flow_id = %id, node = %instance.current_node, "Cannot resume flow instance at unknown node");
                return Resumption::Skipped;
            }
        };

        let node_name = instance.current_node.clone();
        let attempt = instance.current_attempt;

        match mode {
            ExecutionMode::Polling => {
                self.halted.remove(&id);
                self.slots.insert(id.clone(), Arc::new(Mutex::new(instance)));
                self.queue.arm(PollKey::new(id.clone(), node_name.clone()), Instant::now());
                info!(flow_id = %id, node = %node_name, attempt, "Re-armed polling node");
                Resumption::Rearmed
            }
            ExecutionMode::Immediate if self.config.resume_immediate_on_recovery => {
                self.halted.remove(&id);
                self.slots.insert(id.clone(), Arc::new(Mutex::new(instance)));
                info!(flow_id = %id, node = %node_name, "Re-driving immediate node");
                self.spawn_drive(id);
                Resumption::Resumed
            }
            ExecutionMode::Immediate => {
                warn!(flow_id = %id, node = %node_name, "Leaving instance parked at immediate node");
                Resumption::Skipped
            }
        }
    }

    async fn run_chain(&self, instance: &mut FlowInstance) -> Result<DriveOutcome, CoreError> {
        let template = self.registry.lookup(&instance.template_name)?;

        loop {
            let node = template.node(&instance.current_node).ok_or_else(|| {
                CoreError::InvalidTemplate(format!(
                    "template '{}' has no node '{}'",
                    template.name(),
                    instance.current_node
                ))
            })?;

            let step = self.execute_node(node, instance).await?;
            if let Some(outcome) = self.after_step(step, instance) {
                return Ok(outcome);
            }
        }
    }

    fn after_step(&self, step: Step, instance: &FlowInstance) -> Option<DriveOutcome> {
        match step {
            Step::Continue => None,
            Step::Suspended => Some(DriveOutcome::Suspended {
                node: instance.current_node.clone(),
            }),
            Step::Terminated => {
                self.slots.remove(&instance.id);
                info!(
                    flow_id = %instance.id,
                    status = ?instance.status,
                    node = %instance.current_node,
                    "Flow instance finished"
                );
                Some(DriveOutcome::Finished(instance.status))
            }
        }
    }

    async fn execute_node(
        &self,
        node: &NodeDefinition,
        instance: &mut FlowInstance,
    ) -> Result<Step, CoreError> {
        let attempt = instance.current_attempt + 1;
        let mut candidate = instance.clone();
        candidate.current_attempt = attempt;

        let mut state = NodeState::new(instance.id.clone(), node.name.clone(), attempt);
        state.begin()?;

        debug!(
            flow_id = %instance.id,
            template = %instance.template_name,
            node = %node.name,
            mode = ?node.mode,
            attempt,
            "Executing node"
        );

        let result = AssertUnwindSafe(node.executor.run(&mut state, &mut candidate.context))
            .catch_unwind()
            .await;
        let resolution = self.resolve(node, &candidate, &mut state, result);

        self.commit(node, instance, candidate, state, resolution).await
    }

    fn resolve(
        &self,
        node: &NodeDefinition,
        candidate: &FlowInstance,
        state: &mut NodeState,
        result: Result<Result<NodeOutcome, CoreError>, Box<dyn Any + Send>>,
    ) -> Resolution {
        let resolution = match result {
            Ok(Ok(NodeOutcome::Success)) => Resolution::Succeeded,
            Ok(Ok(NodeOutcome::Failed(reason))) => Resolution::Failed {
                kind: FailureKind::Business,
                reason,
            },
            Ok(Ok(NodeOutcome::Pending)) => match node.mode {
                ExecutionMode::Polling => Resolution::Pending,
                ExecutionMode::Immediate => Resolution::Failed {
                    kind: FailureKind::ExecutorError,
                    reason: "immediate node returned Pending".to_string(),
                },
            },
            Ok(Err(e)) if node.mode == ExecutionMode::Polling && e.is_transient() => {
                warn!(
                    flow_id = %candidate.id,
                    node = %node.name,
                    attempt = state.attempt,
                    error = %e,
                    "Transient error, treating attempt as pending"
                );
                state.error_message = Some(e.to_string());
                Resolution::Pending
            }
            Ok(Err(e)) => Resolution::Failed {
                kind: FailureKind::ExecutorError,
                reason: e.to_string(),
            },
            Err(panic) => Resolution::Failed {
                kind: FailureKind::ExecutorError,
                reason: format!("executor panicked: {}", panic_message(panic.as_ref())),
            },
        };

        match resolution {
            Resolution::Pending => match self.exhausted(node, candidate, state.attempt) {
                Some(reason) => Resolution::Failed {
                    kind: FailureKind::AttemptsExhausted,
                    reason,
                },
                None => Resolution::Pending,
            },
            other => other,
        }
    }

    fn exhausted(&self, node: &NodeDefinition, candidate: &FlowInstance, attempt: u32) -> Option<String> {
        let max_attempts = node
            .polling
            .max_attempts
            .or(self.config.default_max_attempts);
        if let Some(max) = max_attempts {
            if attempt >= max {
                return Some(format!("polling attempts exhausted ({}/{})", attempt, max));
            }
        }

        let deadline = node
            .polling
            .deadline
            .or_else(|| self.config.default_deadline());
        if let Some(deadline) = deadline {
            // A clock that moved backwards counts as no time spent at the node
            let elapsed = match (Utc::now() - candidate.node_entered_at).to_std() {
                Ok(elapsed) => elapsed,
                Err(_) => {
                    debug!(
                        flow_id = %candidate.id,
                        node = %node.name,
                        entered_at = %candidate.node_entered_at,
                        "Node entry time is in the future"
                    );
                    Duration::ZERO
                }
            };
            if elapsed >= deadline {
                return Some(format!(
                    "polling deadline of {}ms exceeded after {} attempts",
                    deadline.as_millis(),
                    attempt
                ));
            }
        }

        None
    }

    async fn commit(
        &self,
        node: &NodeDefinition,
        instance: &mut FlowInstance,
        mut candidate: FlowInstance,
        mut state: NodeState,
        resolution: Resolution,
    ) -> Result<Step, CoreError> {
        let step = self.apply(node, &mut candidate, &mut state, resolution)?;

        if let Err(e) = self.persist(&candidate, Some(&state)).await {
            self.halt(&instance.id, &e);
            return Err(e);
        }

        *instance = candidate;
        self.dispatch_events(instance).await;

        if step == Step::Suspended {
            let interval = node
                .polling
                .interval
                .unwrap_or_else(|| self.config.poll_interval());
            self.queue.arm(
                PollKey::new(instance.id.clone(), node.name.clone()),
                Instant::now() + interval,
            );
        }

        Ok(step)
    }

    fn apply(
        &self,
        node: &NodeDefinition,
        candidate: &mut FlowInstance,
        state: &mut NodeState,
        resolution: Resolution,
    ) -> Result<Step, CoreError> {
        match resolution {
            Resolution::Succeeded => {
                state.succeed()?;
                candidate.record_event(Box::new(NodeSucceeded {
                    flow_instance_id: candidate.id.clone(),
                    node_name: node.name.clone(),
                    attempt: state.attempt,
                    timestamp: Utc::now(),
                }));
                debug!(flow_id = %candidate.id, node = %node.name, attempt = state.attempt, "Node succeeded");

                match node.on_success.as_deref() {
                    Some(next) => {
                        candidate.advance_to(next)?;
                        Ok(Step::Continue)
                    }
                    None if candidate.failure_path => {
                        let error = candidate
                            .last_error
                            .clone()
                            .unwrap_or_else(|| "failure path completed".to_string());
                        candidate.fail(error)?;
                        Ok(Step::Terminated)
                    }
                    None => {
                        candidate.complete()?;
                        Ok(Step::Terminated)
                    }
                }
            }
            Resolution::Failed { kind, reason } => {
                state.fail(kind, reason.clone())?;
                candidate.record_event(Box::new(NodeFailed {
                    flow_instance_id: candidate.id.clone(),
                    node_name: node.name.clone(),
                    attempt: state.attempt,
                    reason: reason.clone(),
                    timestamp: Utc::now(),
                }));
                warn!(
                    flow_id = %candidate.id,
                    node = %node.name,
                    attempt = state.attempt,
                    failure = ?kind,
                    reason = %reason,
                    "Node failed"
                );

                let error = format!("{}: {}", node.name, reason);
                match node.on_failure.as_deref() {
                    Some(next) => {
                        candidate.enter_failure_path(error);
                        candidate.advance_to(next)?;
                        Ok(Step::Continue)
                    }
                    None => {
                        candidate.fail(error)?;
                        Ok(Step::Terminated)
                    }
                }
            }
            Resolution::Pending => {
                state.suspend()?;
                candidate.record_event(Box::new(NodeSuspended {
                    flow_instance_id: candidate.id.clone(),
                    node_name: node.name.clone(),
                    attempt: state.attempt,
                    timestamp: Utc::now(),
                }));
                debug!(flow_id = %candidate.id, node = %node.name, attempt = state.attempt, "Node pending");
                Ok(Step::Suspended)
            }
        }
    }

    async fn persist(&self, instance: &FlowInstance, state: Option<&NodeState>) -> Result<(), CoreError> {
        let mut retries = 0;
        loop {
            match self.persist_once(instance, state).await {
                Ok(()) => return Ok(()),
                Err(e) if retries < self.config.persist_retries => {
                    retries += 1;
                    warn!(
                        flow_id = %instance.id,
                        retry = retries,
                        error = %e,
                        "Persistence failed, retrying"
                    );
                    tokio::time::sleep(self.config.persist_retry_backoff()).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn persist_once(&self, instance: &FlowInstance, state: Option<&NodeState>) -> Result<(), CoreError> {
        if let Some(state) = state {
            self.gateway.save_node_state(state).await?;
        }
        self.gateway.save_flow_instance(instance).await
    }

    fn halt(&self, id: &FlowInstanceId, cause: &CoreError) {
        self.slots.remove(id);
        self.queue.disarm_instance(id);
        self.halted.insert(id.clone(), cause.to_string());
        error!(
            alert = "persistence",
            flow_id = %id,
            error = %cause,
            "Halting flow instance after persistence failure"
        );
    }

    async fn dispatch_events(&self, instance: &mut FlowInstance) {
        for event in instance.take_events() {
            let event_type = event.event_type();
            if let Err(e) = self.event_handler.handle_event(event).await {
                warn!(flow_id = %instance.id, event_type, error = %e, "Domain event handler failed");
            }
        }
    }

    async fn slot(&self, id: &FlowInstanceId) -> Result<Slot, CoreError> {
        if let Some(reason) = self.halted.get(id) {
            return Err(CoreError::InstanceHalted(format!("{}: {}", id, reason.value())));
        }
        if let Some(slot) = self.slots.get(id) {
            return Ok(slot.value().clone());
        }

        let instance = self
            .gateway
            .load_instance(id)
            .await?
            .ok_or_else(|| CoreError::FlowInstanceNotFound(id.to_string()))?;

        let slot = self
            .slots
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(instance)))
            .value()
            .clone();
        Ok(slot)
    }

    fn owns(&self, id: &FlowInstanceId, slot: &Slot) -> bool {
        self.slots
            .get(id)
            .map(|current| Arc::ptr_eq(current.value(), slot))
            .unwrap_or(false)
    }

    fn release(&self, id: &FlowInstanceId, slot: &Slot) {
        self.slots.remove_if(id, |_, current| Arc::ptr_eq(current, slot));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
