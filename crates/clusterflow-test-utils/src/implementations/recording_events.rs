//! Event handler that remembers what it saw.

use async_trait::async_trait;
use clusterflow_core::{CoreError, DomainEvent, DomainEventHandler, FlowInstanceId};
use parking_lot::Mutex;

/// Records `(flow id, event type)` for every event
#[derive(Default)]
pub struct RecordingEventHandler {
    events: Mutex<Vec<(FlowInstanceId, String)>>,
}

impl RecordingEventHandler {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Event types recorded for an instance, in order
    pub fn event_types(&self, id: &FlowInstanceId) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter(|(flow_id, _)| flow_id == id)
            .map(|(_, event_type)| event_type.clone())
            .collect()
    }

    /// Number of events of a type across all instances
    pub fn count(&self, event_type: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|(_, recorded)| recorded == event_type)
            .count()
    }
}

#[async_trait]
impl DomainEventHandler for RecordingEventHandler {
    async fn handle_event(&self, event: Box<dyn DomainEvent>) -> Result<(), CoreError> {
        self.events
            .lock()
            .push((event.flow_instance_id().clone(), event.event_type().to_string()));
        Ok(())
    }
}
