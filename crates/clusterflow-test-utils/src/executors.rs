//! Node executors with scripted behavior.

use async_trait::async_trait;
use clusterflow_core::{CoreError, FlowContext, NodeExecutor, NodeOutcome, NodeState};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Executor that replays a queue of results, then repeats a fallback
///
/// Every invocation records the attempt number it saw.
pub struct ScriptedExecutor {
    script: Mutex<VecDeque<Result<NodeOutcome, CoreError>>>,
    fallback: Result<NodeOutcome, CoreError>,
    writes: Vec<(String, Value)>,
    attempts: Mutex<Vec<u32>>,
    calls: AtomicUsize,
}

impl ScriptedExecutor {
    /// Always return `outcome`
    pub fn always(outcome: NodeOutcome) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Ok(outcome),
            writes: Vec::new(),
            attempts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Always succeed
    pub fn success() -> Self {
        Self::always(NodeOutcome::Success)
    }

    /// Always fail with a business failure
    pub fn failing(reason: &str) -> Self {
        Self::always(NodeOutcome::Failed(reason.to_string()))
    }

    /// Always return an executor error
    pub fn erroring(error: CoreError) -> Self {
        let mut executor = Self::success();
        executor.fallback = Err(error);
        executor
    }

    /// Return `Pending` `times` times, then `then`
    pub fn pending_then(times: usize, then: NodeOutcome) -> Self {
        let executor = Self::always(then);
        {
            let mut script = executor.script.lock();
            for _ in 0..times {
                script.push_back(Ok(NodeOutcome::Pending));
            }
        }
        executor
    }

    /// Queue one more result ahead of the fallback
    pub fn then(self, result: Result<NodeOutcome, CoreError>) -> Self {
        self.script.lock().push_back(result);
        self
    }

    /// Write a context value on every invocation
    pub fn writing(mut self, key: &str, value: Value) -> Self {
        self.writes.push((key.to_string(), value));
        self
    }

    /// Number of invocations
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Attempt numbers seen, in invocation order
    pub fn attempts(&self) -> Vec<u32> {
        self.attempts.lock().clone()
    }

    /// Share as a node executor
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl NodeExecutor for ScriptedExecutor {
    async fn run(&self, node: &mut NodeState, ctx: &mut FlowContext) -> Result<NodeOutcome, CoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.attempts.lock().push(node.attempt);

        for (key, value) in &self.writes {
            ctx.set(key.clone(), value.clone());
        }

        let next = self.script.lock().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

/// Executor that panics
pub struct PanickingExecutor {
    message: String,
}

impl PanickingExecutor {
    /// Panic with `message`
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl NodeExecutor for PanickingExecutor {
    async fn run(&self, _node: &mut NodeState, _ctx: &mut FlowContext) -> Result<NodeOutcome, CoreError> {
        panic!("{}", self.message);
    }
}

/// Executor that sleeps before succeeding
pub struct SlowExecutor {
    delay: Duration,
    calls: AtomicUsize,
}

impl SlowExecutor {
    /// Succeed after `delay`
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of invocations
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NodeExecutor for SlowExecutor {
    async fn run(&self, _node: &mut NodeState, _ctx: &mut FlowContext) -> Result<NodeOutcome, CoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(NodeOutcome::Success)
    }
}
