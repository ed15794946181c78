/// Template registry
pub mod registry;

/// Node executor runtime
pub mod runtime;

/// Polling queue and scheduler
pub mod polling;

/// Engine facade
pub mod engine;
