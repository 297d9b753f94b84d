//! File record repository.

use crate::error::MetadataResult;
use crate::models::{FileRow, FileWithProfileRow, Page, SearchParams};
use async_trait::async_trait;
use time::OffsetDateTime;

/// Repository for file records.
#[async_trait]
pub trait FileRepo: Send + Sync {
    /// Insert a file row and return its id. `file.id` is ignored.
    async fn create_file(&self, file: &FileRow) -> MetadataResult<i64>;

    /// Get a file by id regardless of tenant or removal state.
    async fn get_file(&self, id: i64) -> MetadataResult<Option<FileRow>>;

    /// Soft-delete files of a tenant. Returns the number of rows newly marked.
    async fn mark_removed(
        &self,
        domain_id: i64,
        ids: &[i64],
        updated_at: OffsetDateTime,
    ) -> MetadataResult<u64>;

    /// Get a live file together with its profile's version stamp.
    async fn get_file_with_profile(
        &self,
        domain_id: i64,
        id: i64,
    ) -> MetadataResult<Option<FileWithProfileRow>>;

    /// Like [`FileRepo::get_file_with_profile`], by caller-supplied uuid.
    /// The most recent live file wins when several share a uuid.
    async fn get_file_by_uuid_with_profile(
        &self,
        domain_id: i64,
        uuid: &str,
    ) -> MetadataResult<Option<FileWithProfileRow>>;

    /// List a tenant's live files, newest first. `search.q` filters on the view name.
    async fn list_files(
        &self,
        domain_id: i64,
        search: &SearchParams,
    ) -> MetadataResult<Page<FileRow>>;
}
