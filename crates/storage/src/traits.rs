//! Storage trait definitions.

use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use depot_core::{BackendType, FileMeta};
use futures::{Stream, StreamExt};
use std::pin::Pin;
use time::OffsetDateTime;
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;

/// A boxed stream of bytes fed into backend writes.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// A boxed reader returned by backend opens.
pub type ByteReader = Pin<Box<dyn AsyncRead + Send>>;

/// Megabytes per byte, for reporting cumulative write volume.
pub const MB_PER_BYTE: f64 = 0.000001;

/// Capability set implemented by every storage variant.
///
/// Drivers are constructed from a backend profile and cached by profile id.
/// They must be safe to share across tasks; the only mutable state is the
/// monotonically increasing byte counter.
#[async_trait]
pub trait BackendDriver: Send + Sync + 'static {
    /// Display name (the profile name).
    fn name(&self) -> &str;

    /// Storage technology of this driver.
    fn backend_type(&self) -> BackendType;

    /// Verify the backend is reachable and writable.
    async fn test_connection(&self) -> StorageResult<()>;

    /// Open the stored bytes of `file` starting at `offset`.
    ///
    /// The returned reader starts exactly at `offset`; drivers seek natively
    /// instead of reading and discarding.
    async fn open(&self, file: &FileMeta, offset: u64) -> StorageResult<ByteReader>;

    /// Write `data` as `file`, returning the number of bytes stored.
    ///
    /// The driver records whatever it needs to find the object again in
    /// `file.properties`. If an object with the same storage name already
    /// exists the driver returns [`StorageError::AlreadyExists`] carrying the
    /// stored size instead of overwriting it.
    async fn write(&self, data: ByteStream, file: &mut FileMeta) -> StorageResult<u64>;

    /// Delete the stored bytes of `file`.
    ///
    /// Returns [`StorageError::NotFound`] if nothing is stored.
    async fn remove(&self, file: &FileMeta) -> StorageResult<()>;

    /// Version stamp of the configuration this driver was built from.
    fn version(&self) -> OffsetDateTime;

    /// Total bytes written through this instance. Never decreases.
    fn cumulative_bytes(&self) -> u64;

    /// Total written volume in megabytes.
    fn cumulative_mb(&self) -> f64 {
        self.cumulative_bytes() as f64 * MB_PER_BYTE
    }
}

/// Wrap an in-memory buffer as a single-chunk stream.
pub fn bytes_stream(data: impl Into<Bytes>) -> ByteStream {
    let data = data.into();
    Box::pin(futures::stream::once(async move { Ok(data) }))
}

/// Adapt a reader into a byte stream suitable for [`BackendDriver::write`].
pub fn reader_stream(reader: ByteReader) -> ByteStream {
    Box::pin(ReaderStream::new(reader).map(|chunk| chunk.map_err(StorageError::Io)))
}
