//! Error types for lattice operations

use crate::parity::Parity;
use lattice_backends::BackendError;

/// Result type for lattice operations
pub type Result<T> = std::result::Result<T, LatticeError>;

/// Errors that can occur while building, assigning or accessing lattices
#[derive(Debug, thiserror::Error)]
pub enum LatticeError {
    /// Operands live on different topologies
    #[error("conformability failure: {0}")]
    Conformability(String),

    /// Operands carry different checkerboard parities
    #[error("parity mismatch: {left} vs {right}")]
    ParityMismatch { left: Parity, right: Parity },

    /// Expression assignment produced a parity other than Even/Odd
    #[error("expression result parity must be Even or Odd, got {0}")]
    InvalidResultParity(Parity),

    /// Expression has no lattice operand to take a topology from
    #[error("expression has no lattice operand")]
    NoTopology,

    /// Operands were created under different dispatch contexts
    #[error("operands belong to different dispatch contexts")]
    ContextMismatch,

    /// Host access to a site outside the container's checkerboard
    #[error("site {site} has parity {site_parity}, container holds {container}")]
    ParityViolation {
        site: usize,
        site_parity: Parity,
        container: Parity,
    },

    /// Site index outside the buffer
    #[error("site {site} out of range for {osites} sites")]
    SiteOutOfRange { site: usize, osites: usize },

    /// Bulk copy length differs from the container
    #[error("size mismatch: expected {expected} sites, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// Buffer is still referenced by an open region
    #[error("accessor is tracked by an open region")]
    AccessorInUse,

    /// Allocation, transfer or launch failure
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl LatticeError {
    /// Create a conformability failure
    pub fn conformability(msg: impl Into<String>) -> Self {
        Self::Conformability(msg.into())
    }
}
