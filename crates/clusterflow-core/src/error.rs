use thiserror::Error;

/// Core error type for the workflow engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// No template registered under this name
    #[error("Flow template not found: {0}")]
    TemplateNotFound(String),

    /// Template graph is malformed
    #[error("Invalid flow template: {0}")]
    InvalidTemplate(String),

    /// A template with the same name is already registered
    #[error("Flow template already registered: {0}")]
    DuplicateTemplate(String),

    /// Flow instance not found
    #[error("Flow instance not found: {0}")]
    FlowInstanceNotFound(String),

    /// Instance progress was halted after a persistence failure
    #[error("Flow instance halted: {0}")]
    InstanceHalted(String),

    /// Lifecycle transition not allowed from the current state
    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    /// Node executor raised an unexpected error
    #[error("Node execution error: {0}")]
    NodeExecutionError(String),

    /// Retryable collaborator error
    #[error("Transient error: {0}")]
    TransientError(String),

    /// Persistence gateway error
    #[error("Persistence error: {0}")]
    PersistenceError(String),

    /// Required flow context value is absent
    #[error("Context value missing: {0}")]
    ContextValueMissing(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Resource allocator error
    #[error("Resource allocation error: {0}")]
    AllocationError(String),

    /// Operation executor error
    #[error("Operation error: {0}")]
    OperationError(String),

    /// Input/output error
    #[error("Input/output error: {0}")]
    IOError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl CoreError {
    /// Whether a polling node should treat this error as another pending cycle
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::TransientError(_))
    }

    /// Errors that must stop the process at registration time
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            CoreError::TemplateNotFound(_)
                | CoreError::InvalidTemplate(_)
                | CoreError::DuplicateTemplate(_)
                | CoreError::ConfigurationError(_)
        )
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for CoreError {
    fn from(err: serde_yaml::Error) -> Self {
        CoreError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::IOError(err.to_string())
    }
}

impl From<String> for CoreError {
    fn from(err: String) -> Self {
        CoreError::Other(err)
    }
}

impl From<&str> for CoreError {
    fn from(err: &str) -> Self {
        CoreError::Other(err.to_string())
    }
}
