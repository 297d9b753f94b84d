//! Local disk backend.

use crate::error::{StorageError, StorageResult};
use crate::traits::{BackendDriver, ByteReader, ByteStream};
use async_trait::async_trait;
use depot_core::{BackendProfile, BackendType, FileMeta, PROP_DIRECTORY, PROP_PATH_PATTERN};
use futures::StreamExt;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use time::OffsetDateTime;
use tokio::fs;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::instrument;
use uuid::Uuid;

/// Local disk backend.
///
/// Objects live at `{directory}/{expanded path_pattern}/{storage name}`. The
/// expanded pattern is recorded in the file's `directory` property on write
/// so reads and removals resolve to the same place regardless of the clock.
pub struct LocalBackend {
    name: String,
    root: PathBuf,
    path_pattern: String,
    version: OffsetDateTime,
    written: AtomicU64,
}

impl LocalBackend {
    /// Create a backend rooted at `root`. No I/O happens until first use.
    pub fn new(
        name: impl Into<String>,
        root: impl AsRef<Path>,
        path_pattern: impl Into<String>,
        version: OffsetDateTime,
    ) -> Self {
        Self {
            name: name.into(),
            root: root.as_ref().to_path_buf(),
            path_pattern: path_pattern.into(),
            version,
            written: AtomicU64::new(0),
        }
    }

    /// Build from a local backend profile.
    pub fn from_profile(profile: &BackendProfile) -> StorageResult<Self> {
        let directory = profile
            .properties
            .get_str(PROP_DIRECTORY)
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| {
                StorageError::Config(format!(
                    "profile {} has no '{PROP_DIRECTORY}' property",
                    profile.id
                ))
            })?;
        let pattern = profile.properties.get_str(PROP_PATH_PATTERN).unwrap_or("");

        Ok(Self::new(
            profile.name.clone(),
            directory,
            pattern,
            profile.updated_at,
        ))
    }

    /// Base directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Relative key of a file: recorded directory joined with the storage name.
    fn file_key(file: &FileMeta) -> String {
        match file.properties.get_str(PROP_DIRECTORY) {
            Some(dir) if !dir.is_empty() => format!("{}/{}", dir.trim_end_matches('/'), file.name),
            _ => file.name.clone(),
        }
    }

    /// Get the full path for a key, with path traversal protection.
    ///
    /// `canonicalize` and `symlink_metadata` block, so validation runs on the
    /// blocking pool.
    async fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        let root = self.root.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || key_path_sync(&root, &key))
            .await
            .map_err(|e| {
                StorageError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}")))
            })?
    }

    fn not_found_or_io(key: &str, err: std::io::Error) -> StorageError {
        if err.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound(key.to_string())
        } else {
            StorageError::Io(err)
        }
    }
}

/// Reject keys that would escape `root`, including via symlinked ancestors.
fn key_path_sync(root: &Path, key: &str) -> StorageResult<PathBuf> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("empty key".to_string()));
    }
    for component in Path::new(key).components() {
        if !matches!(component, Component::Normal(_)) {
            return Err(StorageError::InvalidKey(format!(
                "contains unsafe path component: {key}"
            )));
        }
    }

    let path = root.join(key);
    let root_canonical = root
        .canonicalize()
        .map_err(|e| LocalBackend::not_found_or_io(key, e))?;

    // Walk from the path itself up to the nearest existing ancestor and make
    // sure it resolves inside the root.
    let mut candidate = Some(path.as_path());
    while let Some(current) = candidate {
        match std::fs::symlink_metadata(current) {
            Ok(meta) => {
                let resolved = current.canonicalize().map_err(|e| {
                    if meta.file_type().is_symlink() {
                        StorageError::InvalidKey(format!("dangling symlink in path: {key}"))
                    } else {
                        StorageError::Io(e)
                    }
                })?;
                if !resolved.starts_with(&root_canonical) {
                    return Err(StorageError::InvalidKey(format!(
                        "resolved path escapes storage root: {key}"
                    )));
                }
                break;
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                candidate = current.parent();
            }
            Err(err) => return Err(StorageError::Io(err)),
        }
    }

    Ok(path)
}

#[async_trait]
impl BackendDriver for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Local
    }

    #[instrument(skip(self), fields(backend = "local", name = %self.name))]
    async fn test_connection(&self) -> StorageResult<()> {
        fs::create_dir_all(&self.root).await?;
        let metadata = fs::metadata(&self.root).await?;
        if !metadata.is_dir() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::NotADirectory,
                format!("storage root is not a directory: {:?}", self.root),
            )));
        }

        // Probe writability with a throwaway file.
        let probe = self.root.join(format!(".probe.{}", Uuid::new_v4()));
        fs::write(&probe, b"").await?;
        fs::remove_file(&probe).await?;
        Ok(())
    }

    #[instrument(skip(self, file), fields(backend = "local", file = %file.name))]
    async fn open(&self, file: &FileMeta, offset: u64) -> StorageResult<ByteReader> {
        let key = Self::file_key(file);
        let path = self.key_path(&key).await?;
        let mut handle = fs::File::open(&path)
            .await
            .map_err(|e| Self::not_found_or_io(&key, e))?;
        if offset > 0 {
            handle.seek(std::io::SeekFrom::Start(offset)).await?;
        }
        Ok(Box::pin(handle))
    }

    #[instrument(skip(self, data, file), fields(backend = "local", file = %file.name))]
    async fn write(&self, data: ByteStream, file: &mut FileMeta) -> StorageResult<u64> {
        let directory = depot_core::pattern::expand(
            &self.path_pattern,
            file.domain_id,
            OffsetDateTime::now_utc(),
        );
        let directory = directory.trim_matches('/').to_string();
        file.properties.set_str(PROP_DIRECTORY, directory);
        let key = Self::file_key(file);

        fs::create_dir_all(&self.root).await?;
        let path = self.key_path(&key).await?;

        if let Ok(existing) = fs::metadata(&path).await {
            return Err(StorageError::AlreadyExists {
                name: file.name.clone(),
                size: existing.len(),
            });
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Stream into a unique sibling, fsync, then publish without clobbering.
        let temp_path = path.with_file_name(format!("{}.tmp.{}", file.name, Uuid::new_v4()));
        let mut out = fs::File::create(&temp_path).await?;
        let mut data = data;
        let mut written: u64 = 0;

        let copied: StorageResult<()> = async {
            while let Some(chunk) = data.next().await {
                let chunk = chunk?;
                out.write_all(&chunk).await?;
                written += chunk.len() as u64;
                self.written.fetch_add(chunk.len() as u64, Ordering::Relaxed);
            }
            out.sync_all().await?;
            Ok(())
        }
        .await;
        drop(out);

        if let Err(e) = copied {
            if let Err(cleanup) = fs::remove_file(&temp_path).await {
                tracing::warn!(path = ?temp_path, error = %cleanup, "failed to remove partial upload");
            }
            return Err(e);
        }

        let published = fs::hard_link(&temp_path, &path).await;
        let _ = fs::remove_file(&temp_path).await;
        match published {
            Ok(()) => {
                tracing::debug!(key = %key, bytes = written, "stored object");
                Ok(written)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let existing = fs::metadata(&path).await?;
                Err(StorageError::AlreadyExists {
                    name: file.name.clone(),
                    size: existing.len(),
                })
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    #[instrument(skip(self, file), fields(backend = "local", file = %file.name))]
    async fn remove(&self, file: &FileMeta) -> StorageResult<()> {
        let key = Self::file_key(file);
        let path = self.key_path(&key).await?;
        fs::remove_file(&path)
            .await
            .map_err(|e| Self::not_found_or_io(&key, e))
    }

    fn version(&self) -> OffsetDateTime {
        self.version
    }

    fn cumulative_bytes(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::bytes_stream;
    use bytes::Bytes;
    use depot_core::Properties;
    use tempfile::tempdir;
    use tokio::io::AsyncReadExt;

    fn backend(root: &Path, pattern: &str) -> LocalBackend {
        LocalBackend::new("test", root, pattern, OffsetDateTime::now_utc())
    }

    async fn read_all(mut reader: ByteReader) -> Vec<u8> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn write_open_remove() {
        let dir = tempdir().unwrap();
        let backend = backend(dir.path(), "$DOMAIN/$Y");
        let mut file = FileMeta::new(7, "abc_hello.txt", "text/plain");

        let size = backend
            .write(bytes_stream(Bytes::from_static(b"hello world")), &mut file)
            .await
            .unwrap();
        assert_eq!(size, 11);

        let recorded = file.properties.get_str(PROP_DIRECTORY).unwrap().to_string();
        assert!(recorded.starts_with("7/"));
        assert!(dir.path().join(&recorded).join("abc_hello.txt").exists());

        let full = read_all(backend.open(&file, 0).await.unwrap()).await;
        assert_eq!(full, b"hello world");

        let tail = read_all(backend.open(&file, 6).await.unwrap()).await;
        assert_eq!(tail, b"world");

        backend.remove(&file).await.unwrap();
        assert!(matches!(
            backend.remove(&file).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn second_write_reports_existing_size() {
        let dir = tempdir().unwrap();
        let backend = backend(dir.path(), "static");
        let mut first = FileMeta::new(1, "same-name", "application/octet-stream");
        backend
            .write(bytes_stream(vec![1u8; 500]), &mut first)
            .await
            .unwrap();

        let mut retry = FileMeta::new(1, "same-name", "application/octet-stream");
        match backend.write(bytes_stream(vec![2u8; 20]), &mut retry).await {
            Err(StorageError::AlreadyExists { size, .. }) => assert_eq!(size, 500),
            other => panic!("expected AlreadyExists, got {other:?}"),
        }
        assert_eq!(retry.properties.get_str(PROP_DIRECTORY), Some("static"));

        let stored = read_all(backend.open(&first, 0).await.unwrap()).await;
        assert_eq!(stored, vec![1u8; 500]);
    }

    #[tokio::test]
    async fn failed_stream_leaves_nothing_behind() {
        let dir = tempdir().unwrap();
        let backend = backend(dir.path(), "");
        let mut file = FileMeta::new(1, "broken", "application/octet-stream");
        let stream: ByteStream = Box::pin(futures::stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(StorageError::SizeLimitExceeded { limit: 7 }),
        ]));

        assert!(matches!(
            backend.write(stream, &mut file).await,
            Err(StorageError::SizeLimitExceeded { .. })
        ));
        let mut entries = std::fs::read_dir(dir.path()).unwrap();
        assert!(entries.next().is_none(), "temp file should be removed");
        assert!(matches!(
            backend.open(&file, 0).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn byte_counter_is_monotonic() {
        let dir = tempdir().unwrap();
        let backend = backend(dir.path(), "");
        for name in ["a", "b"] {
            let mut file = FileMeta::new(1, name, "text/plain");
            backend
                .write(bytes_stream(vec![0u8; 250_000]), &mut file)
                .await
                .unwrap();
        }
        assert_eq!(backend.cumulative_bytes(), 500_000);
        assert!((backend.cumulative_mb() - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn traversal_in_recorded_directory_is_rejected() {
        let dir = tempdir().unwrap();
        let backend = backend(dir.path(), "");
        let mut file = FileMeta::new(1, "x", "text/plain");
        file.properties = Properties::new();
        file.properties.set_str(PROP_DIRECTORY, "../outside");

        assert!(matches!(
            backend.open(&file, 0).await,
            Err(StorageError::InvalidKey(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlinked_ancestor_is_rejected() {
        use std::os::unix::fs::symlink;

        let dir = tempdir().unwrap();
        let outside = tempdir().unwrap();
        symlink(outside.path(), dir.path().join("escape")).unwrap();

        let backend = backend(dir.path(), "escape/nested");
        let mut file = FileMeta::new(1, "file.txt", "text/plain");
        let result = backend
            .write(bytes_stream(Bytes::from_static(b"data")), &mut file)
            .await;

        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
        assert!(!outside.path().join("nested").exists());
    }

    #[tokio::test]
    async fn missing_root_reads_as_not_found() {
        let dir = tempdir().unwrap();
        let backend = backend(&dir.path().join("never-created"), "");
        let file = FileMeta::new(1, "ghost", "text/plain");
        assert!(matches!(
            backend.open(&file, 0).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_connection_creates_root() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("nested/root");
        let backend = backend(&root, "");
        backend.test_connection().await.unwrap();
        assert!(root.is_dir());
    }
}
