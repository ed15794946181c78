//! Assertion and wait helpers for instance state and node history.

use clusterflow_core::{CoreError, FlowEngine, FlowInstance, FlowInstanceId, FlowStatus, NodeState, PollKey};
use std::time::Duration;

const WAIT_STEP: Duration = Duration::from_millis(5);

/// Wait until the persisted instance reaches `status`
pub async fn wait_for_status(
    engine: &FlowEngine,
    id: &FlowInstanceId,
    status: FlowStatus,
    timeout: Duration,
) -> Result<FlowInstance, CoreError> {
    let wait = async {
        loop {
            match engine.instance(id).await {
                Ok(instance) if instance.status == status => return Ok(instance),
                Ok(_) => {}
                Err(e) => return Err(e),
            }
            tokio::time::sleep(WAIT_STEP).await;
        }
    };

    tokio::time::timeout(timeout, wait).await.map_err(|_| {
        CoreError::Other(format!("flow instance {} did not reach {:?} in time", id, status))
    })?
}

/// Wait until the instance is parked at polling node `node`
pub async fn wait_for_parked(
    engine: &FlowEngine,
    id: &FlowInstanceId,
    node: &str,
    timeout: Duration,
) -> Result<(), CoreError> {
    let key = PollKey::new(id.clone(), node);
    let wait = async {
        while !engine.runtime().queue().contains(&key) {
            tokio::time::sleep(WAIT_STEP).await;
        }
    };

    tokio::time::timeout(timeout, wait)
        .await
        .map_err(|_| CoreError::Other(format!("flow instance {} never parked at {}", id, node)))
}

/// Assert the node names of a history, in order
pub fn assert_node_sequence(history: &[NodeState], expected: &[&str]) {
    let actual: Vec<&str> = history.iter().map(|s| s.node_name.as_str()).collect();
    assert_eq!(actual, expected, "unexpected node sequence");
}

/// Assert that consecutive records of the same node have strictly
/// increasing attempt numbers
pub fn assert_attempts_increasing(history: &[NodeState], node: &str) {
    let attempts: Vec<u32> = history
        .iter()
        .filter(|s| s.node_name == node)
        .map(|s| s.attempt)
        .collect();

    for pair in attempts.windows(2) {
        assert!(
            pair[0] < pair[1],
            "attempts for {} are not strictly increasing: {:?}",
            node,
            attempts
        );
    }
}
