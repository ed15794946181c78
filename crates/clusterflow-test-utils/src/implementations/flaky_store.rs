//! Repositories that fail on demand.

use async_trait::async_trait;
use clusterflow_core::{
    CoreError, FlowInstance, FlowInstanceId, FlowInstanceRepository, NodeState,
    NodeStateRepository,
};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Shared switch controlling injected save failures
#[derive(Default)]
pub struct FaultSwitch {
    fail_always: AtomicBool,
    fail_next: AtomicU32,
    passes: AtomicU32,
    failures: AtomicU32,
}

impl FaultSwitch {
    /// A switch that lets everything through
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail every save until cleared
    pub fn fail_always(&self) {
        self.fail_always.store(true, Ordering::SeqCst);
    }

    /// Fail the next `n` saves
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Let the next `passes` saves through, then fail the `n` after them
    pub fn fail_after(&self, passes: u32, n: u32) {
        self.passes.store(passes, Ordering::SeqCst);
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Stop failing
    pub fn clear(&self) {
        self.fail_always.store(false, Ordering::SeqCst);
        self.fail_next.store(0, Ordering::SeqCst);
        self.passes.store(0, Ordering::SeqCst);
    }

    /// Failures injected so far
    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    fn check(&self, what: &str) -> Result<(), CoreError> {
        let always = self.fail_always.load(Ordering::SeqCst);
        if !always && take_one(&self.passes) {
            return Ok(());
        }

        if always || take_one(&self.fail_next) {
            self.failures.fetch_add(1, Ordering::SeqCst);
            return Err(CoreError::PersistenceError(format!("injected failure saving {}", what)));
        }
        Ok(())
    }
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Flow instance repository whose saves fail when any of its switches say so
pub struct FlakyFlowInstanceRepository {
    inner: Arc<dyn FlowInstanceRepository>,
    switches: Vec<Arc<FaultSwitch>>,
}

impl FlakyFlowInstanceRepository {
    /// Wrap a repository
    pub fn new(inner: Arc<dyn FlowInstanceRepository>, switch: Arc<FaultSwitch>) -> Self {
        Self {
            inner,
            switches: vec![switch],
        }
    }

    /// Also fail when `switch` says so
    pub fn with_switch(mut self, switch: Arc<FaultSwitch>) -> Self {
        self.switches.push(switch);
        self
    }
}

#[async_trait]
impl FlowInstanceRepository for FlakyFlowInstanceRepository {
    async fn save(&self, instance: &FlowInstance) -> Result<(), CoreError> {
        for switch in &self.switches {
            switch.check("flow instance")?;
        }
        self.inner.save(instance).await
    }

    async fn find_by_id(&self, id: &FlowInstanceId) -> Result<Option<FlowInstance>, CoreError> {
        self.inner.find_by_id(id).await
    }

    async fn find_active(&self) -> Result<Vec<FlowInstance>, CoreError> {
        self.inner.find_active().await
    }

    async fn find_by_biz_id(&self, biz_id: &str) -> Result<Vec<FlowInstance>, CoreError> {
        self.inner.find_by_biz_id(biz_id).await
    }
}

/// Node state repository whose saves fail when its switch says so
pub struct FlakyNodeStateRepository {
    inner: Arc<dyn NodeStateRepository>,
    switch: Arc<FaultSwitch>,
}

impl FlakyNodeStateRepository {
    /// Wrap a repository
    pub fn new(inner: Arc<dyn NodeStateRepository>, switch: Arc<FaultSwitch>) -> Self {
        Self { inner, switch }
    }
}

#[async_trait]
impl NodeStateRepository for FlakyNodeStateRepository {
    async fn save(&self, state: &NodeState) -> Result<(), CoreError> {
        self.switch.check("node state")?;
        self.inner.save(state).await
    }

    async fn find_for_flow(&self, flow_id: &FlowInstanceId) -> Result<Vec<NodeState>, CoreError> {
        self.inner.find_for_flow(flow_id).await
    }
}
