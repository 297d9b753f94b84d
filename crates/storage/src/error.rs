//! Storage error types.

use thiserror::Error;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    /// The target name is already taken. Carries the size of the stored object
    /// so callers can treat the write as an idempotent no-op.
    #[error("object already exists: {name} ({size} bytes)")]
    AlreadyExists { name: String, size: u64 },

    #[error("upload exceeds the maximum size of {limit} bytes")]
    SizeLimitExceeded { limit: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("upload stream failed: {0}")]
    Source(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
