//! Testing utilities for the clusterflow engine.
//!
//! Scripted node executors, mocks and fakes for the collaborator traits,
//! fault-injecting repositories, an engine builder over the in-memory store,
//! and assertion helpers for instance state and node history.

pub mod assertions;
pub mod builders;
pub mod executors;
pub mod implementations;
pub mod mocks;

/// Re-export commonly used types for convenience
pub use mockall;

pub use assertions::{assert_attempts_increasing, assert_node_sequence, wait_for_parked, wait_for_status};
pub use builders::{test_config, TestEngine, TestEngineBuilder};
pub use executors::{PanickingExecutor, ScriptedExecutor, SlowExecutor};
pub use implementations::fake_allocator::FakeResourceAllocator;
pub use implementations::fake_operations::FakeOperationExecutor;
pub use implementations::flaky_store::{FaultSwitch, FlakyFlowInstanceRepository, FlakyNodeStateRepository};
pub use implementations::recording_events::RecordingEventHandler;
pub use mocks::{MockOperationExecutor, MockResourceAllocator};
