//! Staged upload job repository.

use crate::error::MetadataResult;
use crate::models::{FileRow, UploadJobRow};
use async_trait::async_trait;
use time::OffsetDateTime;

/// Repository for uploads parked in the staging area.
#[async_trait]
pub trait UploadJobRepo: Send + Sync {
    /// Record a staged upload as pending and return its id. `job.id` is ignored.
    async fn create_upload_job(&self, job: &UploadJobRow) -> MetadataResult<i64>;

    async fn get_upload_job(&self, id: i64) -> MetadataResult<Option<UploadJobRow>>;

    /// Claim up to `limit` pending upload jobs, oldest first.
    async fn fetch_upload_jobs(
        &self,
        limit: u32,
        now: OffsetDateTime,
    ) -> MetadataResult<Vec<UploadJobRow>>;

    /// Insert the final file row and delete the upload job in one transaction.
    /// Returns the new file id.
    async fn complete_upload_job(&self, job_id: i64, file: &FileRow) -> MetadataResult<i64>;

    async fn set_upload_job_error(
        &self,
        job_id: i64,
        message: &str,
        now: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Delete error jobs last updated before `older_than`, returning them so
    /// their staged artifacts can be removed.
    async fn remove_upload_errors(
        &self,
        older_than: OffsetDateTime,
    ) -> MetadataResult<Vec<UploadJobRow>>;
}
