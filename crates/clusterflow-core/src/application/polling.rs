//! Polling scheduler.
//!
//! Polling nodes park their instance in a shared [`PollingQueue`] with a due
//! time. The scheduler wakes on a fixed interval, takes every due entry out
//! of the queue, and asks the runtime to make one more attempt for each on a
//! task of its own.
//! Nothing holds a task while the external operation runs.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::application::runtime::{DriveOutcome, FlowRuntime};
use crate::domain::flow_instance::FlowInstanceId;

/// An instance waiting at a polling node
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PollKey {
    /// Instance id
    pub flow_id: FlowInstanceId,

    /// Polling node the instance is parked at
    pub node_name: String,
}

impl PollKey {
    /// Create a key
    pub fn new(flow_id: FlowInstanceId, node_name: impl Into<String>) -> Self {
        Self {
            flow_id,
            node_name: node_name.into(),
        }
    }
}

/// Pending re-invocations and when they are due
#[derive(Debug, Default)]
pub struct PollingQueue {
    entries: DashMap<PollKey, Instant>,
}

impl PollingQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a key, replacing any earlier due time
    pub fn arm(&self, key: PollKey, due: Instant) {
        self.entries.insert(key, due);
    }

    /// Drop a key
    pub fn disarm(&self, key: &PollKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drop every key for an instance
    pub fn disarm_instance(&self, flow_id: &FlowInstanceId) {
        self.entries.retain(|key, _| &key.flow_id != flow_id);
    }

    /// Remove and return keys due at `now`
    ///
    /// A key re-armed while this runs keeps its new due time.
    pub fn take_due(&self, now: Instant) -> Vec<PollKey> {
        let candidates: Vec<PollKey> = self
            .entries
            .iter()
            .filter(|entry| *entry.value() <= now)
            .map(|entry| entry.key().clone())
            .collect();

        candidates
            .into_iter()
            .filter(|key| self.entries.remove_if(key, |_, due| *due <= now).is_some())
            .collect()
    }

    /// Due time of a key
    pub fn due_at(&self, key: &PollKey) -> Option<Instant> {
        self.entries.get(key).map(|entry| *entry.value())
    }

    /// Whether a key is scheduled
    pub fn contains(&self, key: &PollKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Earliest due time
    pub fn next_due(&self) -> Option<Instant> {
        self.entries.iter().map(|entry| *entry.value()).min()
    }

    /// Number of scheduled keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is scheduled
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Background loop re-invoking parked polling nodes
pub struct PollingScheduler {
    runtime: Arc<FlowRuntime>,
    scan_interval: Duration,
    shutdown: Arc<Notify>,
}

impl PollingScheduler {
    /// Create a scheduler over a runtime's queue
    pub fn new(runtime: Arc<FlowRuntime>, scan_interval: Duration) -> Self {
        Self {
            runtime,
            scan_interval,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a handle to signal shutdown
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Stop the loop; takes effect even if `run` has not started waiting yet
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Run until shutdown
    ///
    /// Each scan hands due entries to their own tasks and does not wait for
    /// them, so a long node chain in one instance never delays the next scan.
    pub async fn run(&self) {
        info!(
            scan_interval_ms = self.scan_interval.as_millis() as u64,
            "Polling scheduler started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("Polling scheduler shutting down");
                    break;
                }
                _ = tokio::time::sleep(self.scan_interval) => {
                    self.dispatch_due();
                }
            }
        }
    }

    /// Run one scan and wait for it: every due entry gets exactly one attempt
    ///
    /// Entries run concurrently, each on its own task. Returns the number of
    /// entries taken from the queue.
    pub async fn poll_due(&self) -> usize {
        let tasks = self.dispatch_due();
        let count = tasks.len();

        for task in tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Poll task ended abnormally");
            }
        }

        count
    }

    fn dispatch_due(&self) -> Vec<JoinHandle<()>> {
        let due = self.runtime.queue().take_due(Instant::now());
        if due.is_empty() {
            return Vec::new();
        }

        debug!(count = due.len(), "Polling due nodes");
        due.into_iter()
            .map(|key| tokio::spawn(poll_one(Arc::clone(&self.runtime), key)))
            .collect()
    }
}

async fn poll_one(runtime: Arc<FlowRuntime>, key: PollKey) {
    match runtime.poll(&key).await {
        Ok(DriveOutcome::Stale) => {
            debug!(flow_id = %key.flow_id, node = %key.node_name, "Dropped stale poll entry");
        }
        Ok(outcome) => {
            debug!(flow_id = %key.flow_id, node = %key.node_name, ?outcome, "Poll finished");
        }
        Err(e) => {
            error!(
                flow_id = %key.flow_id,
                node = %key.node_name,
                error = %e,
                "Failed to poll node"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(flow: &str, node: &str) -> PollKey {
        PollKey::new(FlowInstanceId(flow.to_string()), node)
    }

    #[test]
    fn test_take_due_only_returns_due_keys() {
        let queue = PollingQueue::new();
        let now = Instant::now();

        queue.arm(key("a", "deploy"), now);
        queue.arm(key("b", "deploy"), now + Duration::from_secs(60));

        let due = queue.take_due(now);
        assert_eq!(due, vec![key("a", "deploy")]);
        assert_eq!(queue.len(), 1);
        assert!(queue.contains(&key("b", "deploy")));
    }

    #[test]
    fn test_take_due_is_at_most_once() {
        let queue = PollingQueue::new();
        let now = Instant::now();
        queue.arm(key("a", "backup"), now);

        assert_eq!(queue.take_due(now).len(), 1);
        assert!(queue.take_due(now).is_empty());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_rearm_replaces_due_time() {
        let queue = PollingQueue::new();
        let now = Instant::now();
        let later = now + Duration::from_secs(30);

        queue.arm(key("a", "deploy"), now);
        queue.arm(key("a", "deploy"), later);

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.due_at(&key("a", "deploy")), Some(later));
        assert!(queue.take_due(now).is_empty());
        assert_eq!(queue.next_due(), Some(later));
    }

    #[test]
    fn test_disarm() {
        let queue = PollingQueue::new();
        let now = Instant::now();
        queue.arm(key("a", "deploy"), now);
        queue.arm(key("a", "start"), now);
        queue.arm(key("b", "deploy"), now);

        assert!(queue.disarm(&key("b", "deploy")));
        assert!(!queue.disarm(&key("b", "deploy")));

        queue.disarm_instance(&FlowInstanceId("a".to_string()));
        assert!(queue.is_empty());
    }
}
