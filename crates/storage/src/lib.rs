//! Backend driver abstraction for depot.
//!
//! This crate provides:
//! - The `BackendDriver` capability set every storage variant implements
//! - The local disk backend
//! - Variant dispatch from a backend profile's type tag
//! - Upload size limiting for driver input streams

pub mod backends;
pub mod error;
pub mod limit;
pub mod traits;

pub use backends::local::LocalBackend;
pub use error::{StorageError, StorageResult};
pub use limit::limit_stream;
pub use traits::{BackendDriver, ByteReader, ByteStream, MB_PER_BYTE, bytes_stream, reader_stream};

use depot_core::config::DefaultStoreConfig;
use depot_core::{BackendProfile, BackendType};
use std::sync::Arc;
use time::OffsetDateTime;

/// Construct a driver for `profile`, dispatching on its backend type.
pub fn new_backend(profile: &BackendProfile) -> StorageResult<Arc<dyn BackendDriver>> {
    match profile.backend_type {
        BackendType::Local => Ok(Arc::new(LocalBackend::from_profile(profile)?)),
    }
}

/// Create the process-wide default store from configuration and verify it.
pub async fn from_config(config: &DefaultStoreConfig) -> StorageResult<Arc<dyn BackendDriver>> {
    config.validate().map_err(StorageError::Config)?;

    let backend: Arc<dyn BackendDriver> = match config {
        DefaultStoreConfig::Local {
            directory,
            path_pattern,
            ..
        } => Arc::new(LocalBackend::new(
            "default",
            directory,
            path_pattern.clone(),
            OffsetDateTime::now_utc(),
        )),
    };
    backend.test_connection().await?;

    tracing::info!(
        backend = %backend.backend_type(),
        "default store initialized"
    );
    Ok(backend)
}
