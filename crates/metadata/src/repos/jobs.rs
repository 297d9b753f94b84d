//! Sync job queue repository.

use crate::error::MetadataResult;
use crate::models::{ClaimedJobRow, SyncJobRow};
use async_trait::async_trait;
use depot_core::MAX_EXPIRE_DAY;
use std::fmt;
use time::OffsetDateTime;

/// Maximum rows each enqueue source contributes per producer run.
pub const ENQUEUE_BATCH_LIMIT: i64 = 1000;

/// Creation-time cutoff for files expiring after `days`.
///
/// `None` when `days` lies outside `1..=MAX_EXPIRE_DAY` or the cutoff is not
/// representable; such sources are skipped by the producer.
pub fn expiry_cutoff(now: OffsetDateTime, days: i64) -> Option<OffsetDateTime> {
    if !(1..=i64::from(MAX_EXPIRE_DAY)).contains(&days) {
        return None;
    }
    now.checked_sub(time::Duration::days(days))
}

/// Job state as stored. Success deletes the row, so there is no done state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Processing,
    Error,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle action carried by a sync job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobAction {
    Remove,
}

impl JobAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Remove => "remove",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "remove" => Some(Self::Remove),
            _ => None,
        }
    }
}

/// Repository for the durable sync job queue.
///
/// At most one job exists per file; the table carries a unique index on
/// `file_id` and every enqueue path ignores conflicts.
#[async_trait]
pub trait SyncJobRepo: Send + Sync {
    /// Claim up to `limit` pending jobs, oldest first, moving them to
    /// `processing`. Concurrent callers never receive the same job.
    async fn fetch_jobs(&self, limit: u32, now: OffsetDateTime)
    -> MetadataResult<Vec<ClaimedJobRow>>;

    /// Enqueue remove jobs for expired and soft-deleted files.
    ///
    /// Sources: files of each enabled profile with `expire_day > 0` created
    /// before `now - expire_day`; default-store files created before
    /// `now - default_expire_day` when that is positive; files marked removed.
    /// Each source contributes at most [`ENQUEUE_BATCH_LIMIT`] rows.
    /// Returns the number of jobs created.
    async fn set_remove_jobs(&self, now: OffsetDateTime, default_expire_day: u32)
    -> MetadataResult<u64>;

    /// Finish a job: delete the job row and its file row together.
    async fn clean(&self, job_id: i64) -> MetadataResult<()>;

    /// Delete only the job row.
    async fn remove_job(&self, job_id: i64) -> MetadataResult<()>;

    /// Move a job to `error`, recording the message.
    async fn set_error(&self, job_id: i64, message: &str, now: OffsetDateTime)
    -> MetadataResult<()>;

    /// Delete error jobs last updated before `older_than`. Returns the count.
    async fn remove_errors(&self, older_than: OffsetDateTime) -> MetadataResult<u64>;

    async fn get_job(&self, job_id: i64) -> MetadataResult<Option<SyncJobRow>>;

    async fn get_job_for_file(&self, file_id: i64) -> MetadataResult<Option<SyncJobRow>>;
}
