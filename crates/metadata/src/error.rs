//! Metadata store error types.

use thiserror::Error;

/// Metadata store operation errors.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("invalid stored data: {0}")]
    InvalidData(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<depot_core::Error> for MetadataError {
    fn from(err: depot_core::Error) -> Self {
        Self::InvalidData(err.to_string())
    }
}

impl From<std::io::Error> for MetadataError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(format!("io error: {err}"))
    }
}

/// Result type for metadata operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;

/// True if `err` is a unique-constraint violation.
///
/// SQLite reports "UNIQUE constraint failed: ..."; PostgreSQL reports SQLSTATE 23505.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.code().as_deref() == Some("23505")
                || db_err.message().contains("UNIQUE constraint")
        }
        _ => false,
    }
}

/// True if `err` is a foreign-key violation.
pub(crate) fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.code().as_deref() == Some("23503")
                || db_err.message().contains("FOREIGN KEY constraint")
        }
        _ => false,
    }
}
