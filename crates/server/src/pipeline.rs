//! Write/dedup pipeline.
//!
//! Both upload modes end in [`Pipeline::write`]: the target driver is chosen
//! from the file's profile (or the default store), the body is capped at the
//! effective size limit, and an "already exists" answer from the driver is
//! accepted as success with the stored size.

use crate::error::{ApiError, ApiResult};
use crate::resolver::BackendResolver;
use depot_core::{FileMeta, storage_name};
use depot_metadata::MetadataStore;
use depot_metadata::models::{FileRow, UploadJobRow};
use depot_metadata::repos::JobState;
use depot_storage::{
    BackendDriver, ByteStream, LocalBackend, StorageError, limit_stream, reader_stream,
};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;

/// Path pattern of the staging area: one flat directory per tenant.
pub const STAGING_PATTERN: &str = "$DOMAIN";

/// An incoming upload before it has been stored.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub domain_id: i64,
    /// Name given by the uploader.
    pub view_name: String,
    pub mime_type: String,
    /// Caller-supplied identifier. Generated when absent.
    pub uuid: Option<String>,
    /// Target profile. `None` selects the default store.
    pub profile_id: Option<i64>,
}

impl NewFile {
    pub fn new(domain_id: i64, view_name: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            domain_id,
            view_name: view_name.into(),
            mime_type: mime_type.into(),
            uuid: None,
            profile_id: None,
        }
    }

    pub fn with_profile(mut self, profile_id: i64) -> Self {
        self.profile_id = Some(profile_id);
        self
    }
}

pub struct Pipeline {
    metadata: Arc<dyn MetadataStore>,
    resolver: Arc<BackendResolver>,
    staging: Arc<LocalBackend>,
    max_upload_size: u64,
    instance: String,
}

impl Pipeline {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        resolver: Arc<BackendResolver>,
        staging: Arc<LocalBackend>,
        max_upload_size: u64,
        instance: impl Into<String>,
    ) -> Self {
        Self {
            metadata,
            resolver,
            staging,
            max_upload_size,
            instance: instance.into(),
        }
    }

    /// Identifier recorded on rows written by this process.
    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn staging(&self) -> &Arc<LocalBackend> {
        &self.staging
    }

    /// Store an upload synchronously and persist its file row.
    ///
    /// If the row insert fails after the backend write succeeded, the stored
    /// object is left in place and the error is returned.
    #[instrument(skip(self, file, data), fields(domain_id = file.domain_id, profile_id = ?file.profile_id))]
    pub async fn store(&self, file: NewFile, data: ByteStream) -> ApiResult<FileRow> {
        let name = fresh_storage_name(&file.view_name);
        let mut meta = FileMeta::new(file.domain_id, name, file.mime_type.clone());
        let size = self
            .write(file.domain_id, file.profile_id, data, &mut meta)
            .await?;
        meta.size = size;

        let mut row = self.file_row(&file, &meta, OffsetDateTime::now_utc());
        match self.metadata.create_file(&row).await {
            Ok(id) => {
                row.id = id;
                tracing::info!(file_id = id, name = %row.name, bytes = size, "file stored");
                Ok(row)
            }
            Err(e) => {
                tracing::error!(
                    name = %row.name,
                    profile_id = ?row.profile_id,
                    error = %e,
                    "file row not persisted, stored object orphaned"
                );
                Err(e.into())
            }
        }
    }

    /// Park an upload in the staging area and queue it for the upload worker.
    ///
    /// The target is checked first so uploads to a missing or disabled
    /// profile fail before any bytes are staged.
    #[instrument(skip(self, file, data), fields(domain_id = file.domain_id, profile_id = ?file.profile_id))]
    pub async fn stage(&self, file: NewFile, data: ByteStream) -> ApiResult<UploadJobRow> {
        let (_, limit) = self.target(file.domain_id, file.profile_id).await?;

        let name = fresh_storage_name(&file.view_name);
        let mut staged = FileMeta::new(file.domain_id, name, file.mime_type.clone());
        let size = self
            .staging
            .write(limit_stream(data, limit), &mut staged)
            .await?;
        staged.size = size;

        let now = OffsetDateTime::now_utc();
        let mut job = UploadJobRow {
            id: 0,
            domain_id: file.domain_id,
            uuid: file.uuid.unwrap_or_else(|| Uuid::new_v4().to_string()),
            name: staged.name.clone(),
            view_name: file.view_name,
            mime_type: file.mime_type,
            size: size as i64,
            properties: staged.properties.to_json(),
            profile_id: file.profile_id,
            instance: self.instance.clone(),
            state: JobState::Pending.to_string(),
            error: None,
            created_at: now,
            updated_at: now,
        };

        match self.metadata.create_upload_job(&job).await {
            Ok(id) => {
                job.id = id;
                tracing::info!(upload_job_id = id, bytes = size, "upload staged");
                Ok(job)
            }
            Err(e) => {
                self.discard_staged(&staged).await;
                Err(e.into())
            }
        }
    }

    /// Write a staged upload into its backend and finalise it.
    ///
    /// The storage name chosen at staging time is reused, so a retry after a
    /// partial failure lands on the same object and is deduplicated.
    #[instrument(skip(self, job), fields(upload_job_id = job.id, domain_id = job.domain_id))]
    pub async fn commit_staged(&self, job: &UploadJobRow) -> ApiResult<FileRow> {
        let staged = job.staged_meta()?;
        let reader = self.staging.open(&staged, 0).await?;

        let mut meta = FileMeta::new(job.domain_id, job.name.clone(), job.mime_type.clone());
        let size = self
            .write(job.domain_id, job.profile_id, reader_stream(reader), &mut meta)
            .await?;
        meta.size = size;

        let now = OffsetDateTime::now_utc();
        let mut row = FileRow {
            id: 0,
            domain_id: job.domain_id,
            uuid: job.uuid.clone(),
            name: meta.name.clone(),
            view_name: job.view_name.clone(),
            size: size as i64,
            mime_type: job.mime_type.clone(),
            properties: meta.properties.to_json(),
            profile_id: job.profile_id,
            instance: self.instance.clone(),
            removed: false,
            created_at: now,
            updated_at: now,
        };
        row.id = self.metadata.complete_upload_job(job.id, &row).await?;
        tracing::info!(file_id = row.id, bytes = size, "staged upload committed");

        self.discard_staged(&staged).await;
        Ok(row)
    }

    /// Delete a staged artifact, logging failures.
    pub async fn discard_staged(&self, staged: &FileMeta) {
        match self.staging.remove(staged).await {
            Ok(()) | Err(StorageError::NotFound(_)) => {}
            Err(e) => {
                tracing::warn!(name = %staged.name, error = %e, "failed to remove staged upload")
            }
        }
    }

    /// Write `data` to the target backend of `profile_id`.
    ///
    /// Returns the stored size; for an object that already exists this is
    /// the size the driver reports.
    async fn write(
        &self,
        domain_id: i64,
        profile_id: Option<i64>,
        data: ByteStream,
        meta: &mut FileMeta,
    ) -> ApiResult<u64> {
        let (driver, limit) = self.target(domain_id, profile_id).await?;
        match driver.write(limit_stream(data, limit), meta).await {
            Ok(size) => Ok(size),
            Err(StorageError::AlreadyExists { name, size }) => {
                tracing::info!(name = %name, bytes = size, "object already stored, reusing");
                Ok(size)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Driver and effective size limit for an upload.
    async fn target(
        &self,
        domain_id: i64,
        profile_id: Option<i64>,
    ) -> ApiResult<(Arc<dyn BackendDriver>, u64)> {
        let Some(profile_id) = profile_id else {
            let driver = self.resolver.resolve(None, None).await?;
            return Ok((driver, self.max_upload_size));
        };

        let profile = self
            .metadata
            .get_profile(domain_id, profile_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("profile {profile_id}")))?;
        if profile.disabled {
            return Err(ApiError::BadRequest(format!(
                "profile {profile_id} is disabled"
            )));
        }

        let limit = profile
            .max_size_bytes()
            .map_or(self.max_upload_size, |max| max.min(self.max_upload_size));
        let driver = self.resolver.resolve_profile(&profile)?;
        Ok((driver, limit))
    }

    fn file_row(&self, file: &NewFile, meta: &FileMeta, now: OffsetDateTime) -> FileRow {
        FileRow {
            id: 0,
            domain_id: file.domain_id,
            uuid: file
                .uuid
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            name: meta.name.clone(),
            view_name: file.view_name.clone(),
            size: meta.size as i64,
            mime_type: file.mime_type.clone(),
            properties: meta.properties.to_json(),
            profile_id: file.profile_id,
            instance: self.instance.clone(),
            removed: false,
            created_at: now,
            updated_at: now,
        }
    }
}

fn fresh_storage_name(view_name: &str) -> String {
    storage_name(&Uuid::new_v4().simple().to_string(), view_name)
}
