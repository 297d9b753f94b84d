//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("range not satisfiable for object of {size} bytes")]
    RangeNotSatisfiable { size: u64 },

    #[error("invalid backend profile: {0}")]
    InvalidProfile(String),

    #[error("unknown backend type: {0}")]
    UnknownBackendType(String),

    #[error("invalid properties: {0}")]
    InvalidProperties(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
