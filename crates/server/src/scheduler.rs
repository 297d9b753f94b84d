//! Background job processing.
//!
//! Four independent loops share this type:
//! - producer: enqueue remove jobs for expired and soft-deleted files
//! - consumer: claim a batch of jobs and execute them
//! - uploads: move staged uploads into their backends
//! - purge: drop error rows older than the retention window
//!
//! Every step is also callable directly so the admin endpoints can drive
//! the cycle from outside the process.

use crate::pipeline::Pipeline;
use crate::resolver::{BackendResolver, ResolveError};
use depot_core::config::SchedulerConfig;
use depot_metadata::models::ClaimedJobRow;
use depot_metadata::repos::JobAction;
use depot_metadata::{MetadataError, MetadataResult, MetadataStore};
use depot_storage::StorageError;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::task::JoinHandle;

/// Failure while executing a single job. Recorded on the job row.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("unknown job action: {0}")]
    UnknownAction(String),

    #[error("resolve backend: {0}")]
    Resolve(#[from] ResolveError),

    #[error("storage: {0}")]
    Storage(#[from] StorageError),

    #[error("metadata: {0}")]
    Metadata(#[from] MetadataError),
}

/// Outcome of one consumer batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConsumeStats {
    pub claimed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Outcome of one purge run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeStats {
    pub jobs: u64,
    pub uploads: u64,
}

pub struct Scheduler {
    metadata: Arc<dyn MetadataStore>,
    resolver: Arc<BackendResolver>,
    pipeline: Arc<Pipeline>,
    config: SchedulerConfig,
    default_expire_day: u32,
}

impl Scheduler {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        resolver: Arc<BackendResolver>,
        pipeline: Arc<Pipeline>,
        config: SchedulerConfig,
        default_expire_day: u32,
    ) -> Self {
        Self {
            metadata,
            resolver,
            pipeline,
            config,
            default_expire_day,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Enqueue remove jobs. Returns the number created.
    pub async fn produce(&self, now: OffsetDateTime) -> MetadataResult<u64> {
        let enqueued = self
            .metadata
            .set_remove_jobs(now, self.default_expire_day)
            .await?;
        if enqueued > 0 {
            tracing::info!(enqueued, "remove jobs enqueued");
        }
        Ok(enqueued)
    }

    /// Claim one batch and execute it.
    ///
    /// A failing job is marked `error` and the batch carries on.
    pub async fn consume(&self, now: OffsetDateTime) -> MetadataResult<ConsumeStats> {
        self.consume_batch(self.config.batch_size, now).await
    }

    pub async fn consume_batch(
        &self,
        limit: u32,
        now: OffsetDateTime,
    ) -> MetadataResult<ConsumeStats> {
        let jobs = self.metadata.fetch_jobs(limit, now).await?;
        let mut stats = ConsumeStats {
            claimed: jobs.len(),
            ..Default::default()
        };

        for job in &jobs {
            match self.execute(job).await {
                Ok(()) => stats.succeeded += 1,
                Err(e) => {
                    stats.failed += 1;
                    tracing::warn!(job_id = job.id, file_id = job.file_id, error = %e, "job failed");
                    if let Err(record) = self.metadata.set_error(job.id, &e.to_string(), now).await
                    {
                        tracing::error!(job_id = job.id, error = %record, "failed to record job error");
                    }
                }
            }
        }

        if stats.claimed > 0 {
            tracing::info!(
                claimed = stats.claimed,
                succeeded = stats.succeeded,
                failed = stats.failed,
                "job batch processed"
            );
        }
        Ok(stats)
    }

    /// Run one claimed job to completion.
    pub async fn execute(&self, job: &ClaimedJobRow) -> Result<(), JobError> {
        let action =
            JobAction::parse(&job.action).ok_or_else(|| JobError::UnknownAction(job.action.clone()))?;

        match action {
            JobAction::Remove => {
                let meta = job.meta()?;
                let driver = self
                    .resolver
                    .resolve(job.profile_id, job.profile_updated_at)
                    .await?;
                match driver.remove(&meta).await {
                    Ok(()) => {}
                    Err(StorageError::NotFound(_)) => {
                        tracing::debug!(job_id = job.id, name = %meta.name, "object already gone");
                    }
                    Err(e) => return Err(e.into()),
                }
                self.metadata.clean(job.id).await?;
                tracing::debug!(job_id = job.id, file_id = job.file_id, "file removed");
            }
        }
        Ok(())
    }

    /// Commit one batch of staged uploads.
    pub async fn process_uploads(&self, now: OffsetDateTime) -> MetadataResult<ConsumeStats> {
        let jobs = self
            .metadata
            .fetch_upload_jobs(self.config.batch_size, now)
            .await?;
        let mut stats = ConsumeStats {
            claimed: jobs.len(),
            ..Default::default()
        };

        for job in &jobs {
            match self.pipeline.commit_staged(job).await {
                Ok(_) => stats.succeeded += 1,
                Err(e) => {
                    stats.failed += 1;
                    tracing::warn!(upload_job_id = job.id, error = %e, "staged upload failed");
                    if let Err(record) = self
                        .metadata
                        .set_upload_job_error(job.id, &e.to_string(), now)
                        .await
                    {
                        tracing::error!(upload_job_id = job.id, error = %record, "failed to record upload error");
                    }
                }
            }
        }
        Ok(stats)
    }

    /// Delete error rows last touched before `now - error_retention`.
    ///
    /// Purged files become eligible for a fresh remove job; purged uploads
    /// lose their staged artifact.
    pub async fn purge(&self, now: OffsetDateTime) -> MetadataResult<PurgeStats> {
        let cutoff = now - self.config.error_retention();
        let jobs = self.metadata.remove_errors(cutoff).await?;

        let uploads = self.metadata.remove_upload_errors(cutoff).await?;
        for upload in &uploads {
            match upload.staged_meta() {
                Ok(staged) => self.pipeline.discard_staged(&staged).await,
                Err(e) => {
                    tracing::warn!(upload_job_id = upload.id, error = %e, "unreadable staged upload")
                }
            }
        }

        let stats = PurgeStats {
            jobs,
            uploads: uploads.len() as u64,
        };
        if stats.jobs > 0 || stats.uploads > 0 {
            tracing::info!(jobs = stats.jobs, uploads = stats.uploads, "error rows purged");
        }
        Ok(stats)
    }

    /// Start all loops.
    pub fn spawn(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        vec![
            self.spawn_loop("producer", self.config.producer_interval(), |s, now| async move {
                if let Err(e) = s.produce(now).await {
                    tracing::error!(error = %e, "producer run failed");
                }
            }),
            self.spawn_loop("consumer", self.config.consumer_interval(), |s, now| async move {
                if let Err(e) = s.consume(now).await {
                    tracing::error!(error = %e, "consumer run failed");
                }
            }),
            self.spawn_loop("uploads", self.config.upload_interval(), |s, now| async move {
                if let Err(e) = s.process_uploads(now).await {
                    tracing::error!(error = %e, "upload run failed");
                }
            }),
            self.spawn_loop("purge", self.config.purge_interval(), |s, now| async move {
                if let Err(e) = s.purge(now).await {
                    tracing::error!(error = %e, "purge run failed");
                }
            }),
        ]
    }

    fn spawn_loop<F, Fut>(self: &Arc<Self>, task: &'static str, interval: Duration, run: F) -> JoinHandle<()>
    where
        F: Fn(Arc<Self>, OffsetDateTime) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let scheduler = self.clone();
        tokio::spawn(async move {
            tracing::info!(task, interval_secs = interval.as_secs(), "scheduler loop started");
            loop {
                tokio::time::sleep(interval).await;
                run(scheduler.clone(), OffsetDateTime::now_utc()).await;
            }
        })
    }
}
