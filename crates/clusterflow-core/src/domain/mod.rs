/// Flow templates and node definitions
pub mod flow_template;

/// Per-instance context
pub mod flow_context;

/// Flow instance aggregate
pub mod flow_instance;

/// Node execution records
pub mod node_state;

/// Domain events
pub mod events;

/// Persistence gateway
pub mod repository;

/// External collaborator contracts
pub mod collaborators;
