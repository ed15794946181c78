use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::application::polling::PollingScheduler;
use crate::application::runtime::{DriveOutcome, FlowRuntime, RecoveryReport};
use crate::domain::flow_context::FlowContext;
use crate::domain::flow_instance::{FlowInstance, FlowInstanceId};
use crate::domain::node_state::NodeState;
use crate::CoreError;

/// The API surrounding services use to run workflows
pub struct FlowEngine {
    runtime: Arc<FlowRuntime>,
    scheduler: Arc<PollingScheduler>,
    scheduler_task: Mutex<Option<JoinHandle<()>>>,
}

impl FlowEngine {
    /// Wrap a runtime; the scheduler scans at the runtime's configured interval
    pub fn new(runtime: FlowRuntime) -> Self {
        let scan_interval = runtime.config().scan_interval();
        let runtime = Arc::new(runtime);
        let scheduler = Arc::new(PollingScheduler::new(Arc::clone(&runtime), scan_interval));

        Self {
            runtime,
            scheduler,
            scheduler_task: Mutex::new(None),
        }
    }

    /// The underlying runtime
    pub fn runtime(&self) -> &Arc<FlowRuntime> {
        &self.runtime
    }

    /// The polling scheduler
    pub fn scheduler(&self) -> &Arc<PollingScheduler> {
        &self.scheduler
    }

    /// Create an instance and start it without waiting for it to finish
    ///
    /// Returns once the instance is durably in `Processing`. An instance that
    /// cannot be started is canceled before the error is returned.
    pub async fn create_and_start(
        &self,
        template_name: &str,
        biz_id: &str,
        initial_context: FlowContext,
    ) -> Result<FlowInstanceId, CoreError> {
        let id = self
            .runtime
            .create_instance(template_name, biz_id, initial_context)
            .await?;

        if let Err(e) = self.runtime.start(&id).await {
            warn!(flow_id = %id, error = %e, "Flow instance created but not started");
            if let Err(cancel_error) = self.runtime.abort(&id, "flow instance could not be started").await {
                warn!(flow_id = %id, error = %cancel_error, "Could not cancel unstarted flow instance");
            }
            return Err(e);
        }

        Ok(id)
    }

    /// Last persisted state of an instance
    pub async fn instance(&self, id: &FlowInstanceId) -> Result<FlowInstance, CoreError> {
        self.runtime
            .gateway()
            .load_instance(id)
            .await?
            .ok_or_else(|| CoreError::FlowInstanceNotFound(id.to_string()))
    }

    /// Node execution records of an instance
    pub async fn node_history(&self, id: &FlowInstanceId) -> Result<Vec<NodeState>, CoreError> {
        self.runtime.gateway().load_node_states(id).await
    }

    /// Instances for a business entity
    pub async fn instances_for_biz(&self, biz_id: &str) -> Result<Vec<FlowInstance>, CoreError> {
        self.runtime.gateway().load_instances_for_biz(biz_id).await
    }

    /// Instances halted by persistence failures
    pub fn halted_instances(&self) -> Vec<(FlowInstanceId, String)> {
        self.runtime.halted_instances()
    }

    /// Force the current node to fail and run the failure path
    pub async fn abort(&self, id: &FlowInstanceId, reason: &str) -> Result<DriveOutcome, CoreError> {
        self.runtime.abort(id, reason).await
    }

    /// Continue a halted instance from its durable state
    pub async fn resume_instance(&self, id: &FlowInstanceId) -> Result<(), CoreError> {
        self.runtime.resume_instance(id).await
    }

    /// Reload in-flight instances
    pub async fn recover(&self) -> Result<RecoveryReport, CoreError> {
        self.runtime.recover().await
    }

    /// Run the polling scheduler on a background task
    pub async fn start_scheduler(&self) {
        let mut task = self.scheduler_task.lock().await;
        if task.is_some() {
            return;
        }

        let scheduler = Arc::clone(&self.scheduler);
        *task = Some(tokio::spawn(async move { scheduler.run().await }));
    }

    /// Stop the polling scheduler and wait for it
    ///
    /// Instances parked at polling nodes stay durable and are re-armed by
    /// the next `recover`.
    pub async fn shutdown(&self) {
        let task = self.scheduler_task.lock().await.take();
        if let Some(task) = task {
            self.scheduler.shutdown();
            if let Err(e) = task.await {
                warn!(error = %e, "Polling scheduler task ended abnormally");
            }
        }
        info!(parked = self.runtime.queue().len(), "Flow engine stopped");
    }
}
