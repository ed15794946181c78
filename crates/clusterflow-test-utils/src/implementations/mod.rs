//! Fake implementations of engine seams.

pub mod fake_allocator;
pub mod fake_operations;
pub mod flaky_store;
pub mod recording_events;
