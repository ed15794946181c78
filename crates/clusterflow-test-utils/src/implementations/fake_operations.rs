//! Operation executor with scripted status checks.

use async_trait::async_trait;
use clusterflow_core::{
    CoreError, OperationExecutor, OperationHandle, OperationKind, OperationParams, OperationStatus,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

/// Operation executor whose status checks replay a per-kind script
///
/// Each kind reports `Success` once its script runs out.
#[derive(Default)]
pub struct FakeOperationExecutor {
    scripts: Mutex<HashMap<OperationKind, VecDeque<OperationStatus>>>,
    handles: Mutex<HashMap<String, OperationKind>>,
    invocations: Mutex<Vec<OperationParams>>,
    checks: Mutex<Vec<OperationHandle>>,
    failing_invoke: Mutex<Option<OperationKind>>,
}

impl FakeOperationExecutor {
    /// Create an executor whose actions finish on the first check
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue statuses for the next checks of `kind`
    pub fn script(self, kind: OperationKind, statuses: Vec<OperationStatus>) -> Self {
        self.scripts.lock().entry(kind).or_default().extend(statuses);
        self
    }

    /// Report `Pending` for the first `times` checks of `kind`
    pub fn pending_for(self, kind: OperationKind, times: usize) -> Self {
        self.script(kind, vec![OperationStatus::Pending; times])
    }

    /// Reject invocations of `kind`
    pub fn reject_invoke(self, kind: OperationKind) -> Self {
        *self.failing_invoke.lock() = Some(kind);
        self
    }

    /// Parameters of every invocation
    pub fn invocations(&self) -> Vec<OperationParams> {
        self.invocations.lock().clone()
    }

    /// Number of invocations of `kind`
    pub fn invocations_of(&self, kind: OperationKind) -> usize {
        self.invocations.lock().iter().filter(|p| p.kind == kind).count()
    }

    /// Number of status checks
    pub fn checks(&self) -> usize {
        self.checks.lock().len()
    }
}

#[async_trait]
impl OperationExecutor for FakeOperationExecutor {
    async fn invoke(&self, params: &OperationParams) -> Result<OperationHandle, CoreError> {
        if *self.failing_invoke.lock() == Some(params.kind) {
            return Err(CoreError::OperationError(format!(
                "{} rejected for {}",
                params.kind, params.cluster_id
            )));
        }

        let mut invocations = self.invocations.lock();
        invocations.push(params.clone());
        let handle = format!("{}-{}-{}", params.kind, params.cluster_id, invocations.len());
        self.handles.lock().insert(handle.clone(), params.kind);
        Ok(OperationHandle(handle))
    }

    async fn check_status(&self, handle: &OperationHandle) -> Result<OperationStatus, CoreError> {
        self.checks.lock().push(handle.clone());

        let kind = self
            .handles
            .lock()
            .get(&handle.0)
            .copied()
            .ok_or_else(|| CoreError::OperationError(format!("unknown operation handle {}", handle)))?;

        let status = self
            .scripts
            .lock()
            .get_mut(&kind)
            .and_then(|script| script.pop_front())
            .unwrap_or(OperationStatus::Success);
        Ok(status)
    }
}
