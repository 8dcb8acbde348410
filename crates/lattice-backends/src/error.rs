//! Error types for backend operations

/// Result type for backend operations
pub type Result<T> = std::result::Result<T, BackendError>;

/// Errors that can occur while allocating, transferring or launching
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Device or host allocation failed
    #[error("allocation of {requested} bytes failed: {reason}")]
    AllocationFailed { requested: usize, reason: String },

    /// Operation requires a bound accessor
    #[error("accessor {0} is not bound to a buffer")]
    Unbound(String),

    /// Host-path access outside a region that materialized the accessor
    #[error("host access to accessor {0} is not open")]
    HostAccessClosed(String),

    /// A device launch or synchronization reported an error
    #[error("backend execution fault: {0}")]
    ExecutionFault(String),

    /// Invalid launch geometry or dispatch configuration
    #[error("invalid launch configuration: {0}")]
    InvalidLaunchConfig(String),

    /// The requested device runtime is not present
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Source and destination lengths differ
    #[error("size mismatch: expected {expected} elements, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl BackendError {
    /// Create an allocation failure for `requested` bytes
    pub fn allocation(requested: usize, reason: impl ToString) -> Self {
        Self::AllocationFailed {
            requested,
            reason: reason.to_string(),
        }
    }

    /// Create an execution fault
    pub fn execution_fault(msg: impl Into<String>) -> Self {
        Self::ExecutionFault(msg.into())
    }

    /// Create an invalid launch configuration error
    pub fn invalid_launch(msg: impl Into<String>) -> Self {
        Self::InvalidLaunchConfig(msg.into())
    }
}
