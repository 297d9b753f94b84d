//! Background endpoints: drive the job cycle from outside the process.
//!
//! All routes here sit behind the admin bearer token.

use crate::error::{ApiError, ApiResult};
use crate::scheduler::{ConsumeStats, PurgeStats};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Query, State};
use depot_core::BackendType;
use depot_metadata::models::{ClaimedJobRow, SyncJobRow};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Default, Deserialize)]
pub struct BatchQuery {
    /// Batch size; defaults to the scheduler's.
    pub limit: Option<u32>,
}

impl BatchQuery {
    fn limit(&self, state: &AppState) -> ApiResult<u32> {
        match self.limit {
            Some(0) => Err(ApiError::BadRequest("limit must be positive".to_string())),
            Some(limit) => Ok(limit),
            None => Ok(state.scheduler.config().batch_size),
        }
    }
}

/// POST /v1/admin/jobs/fetch - Claim pending jobs for an external worker.
///
/// Claimed jobs move to `processing`; the caller owns them from here.
pub async fn fetch_jobs(
    State(state): State<AppState>,
    Query(query): Query<BatchQuery>,
) -> ApiResult<Json<Vec<ClaimedJobRow>>> {
    let limit = query.limit(&state)?;
    let jobs = state
        .metadata
        .fetch_jobs(limit, OffsetDateTime::now_utc())
        .await?;
    Ok(Json(jobs))
}

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    pub enqueued: u64,
}

/// POST /v1/admin/jobs/enqueue-removals - Run the producer once.
pub async fn enqueue_removals(State(state): State<AppState>) -> ApiResult<Json<EnqueueResponse>> {
    let enqueued = state.scheduler.produce(OffsetDateTime::now_utc()).await?;
    Ok(Json(EnqueueResponse { enqueued }))
}

/// POST /v1/admin/jobs/purge-errors - Run the purge once.
pub async fn purge_errors(State(state): State<AppState>) -> ApiResult<Json<PurgeStats>> {
    let stats = state.scheduler.purge(OffsetDateTime::now_utc()).await?;
    Ok(Json(stats))
}

/// POST /v1/admin/jobs/run - Claim and execute one batch in-process.
pub async fn run_jobs(
    State(state): State<AppState>,
    Query(query): Query<BatchQuery>,
) -> ApiResult<Json<ConsumeStats>> {
    let limit = query.limit(&state)?;
    let stats = state
        .scheduler
        .consume_batch(limit, OffsetDateTime::now_utc())
        .await?;
    Ok(Json(stats))
}

/// GET /v1/admin/jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<i64>,
) -> ApiResult<Json<SyncJobRow>> {
    let job = state
        .metadata
        .get_job(job_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("job {job_id}")))?;
    Ok(Json(job))
}

/// GET /v1/admin/files/{id}/job - The active job of a file, if any.
pub async fn get_job_for_file(
    State(state): State<AppState>,
    Path(file_id): Path<i64>,
) -> ApiResult<Json<Option<SyncJobRow>>> {
    Ok(Json(state.metadata.get_job_for_file(file_id).await?))
}

/// DELETE /v1/admin/jobs/{id} - Drop a job row, e.g. one stuck in `processing`.
///
/// The file keeps its row and becomes eligible for a new job.
pub async fn delete_job(
    State(state): State<AppState>,
    Path(job_id): Path<i64>,
) -> ApiResult<axum::http::StatusCode> {
    state.metadata.remove_job(job_id).await?;
    tracing::info!(job_id, "job removed by admin");
    Ok(axum::http::StatusCode::NO_CONTENT)
}

/// POST /v1/admin/uploads/run - Commit one batch of staged uploads.
pub async fn run_uploads(State(state): State<AppState>) -> ApiResult<Json<ConsumeStats>> {
    let stats = state
        .scheduler
        .process_uploads(OffsetDateTime::now_utc())
        .await?;
    Ok(Json(stats))
}

/// A live driver and its write volume.
#[derive(Debug, Serialize)]
pub struct BackendInfo {
    /// `None` for the default store.
    pub profile_id: Option<i64>,
    pub name: String,
    #[serde(rename = "type")]
    pub backend_type: BackendType,
    pub cumulative_mb: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub version: OffsetDateTime,
}

/// GET /v1/admin/backends
pub async fn list_backends(State(state): State<AppState>) -> ApiResult<Json<Vec<BackendInfo>>> {
    let default = state.resolver.default_store().map(|driver| BackendInfo {
        profile_id: None,
        name: driver.name().to_string(),
        backend_type: driver.backend_type(),
        cumulative_mb: driver.cumulative_mb(),
        version: driver.version(),
    });

    let mut cached: Vec<BackendInfo> = state
        .resolver
        .cached_drivers()
        .into_iter()
        .map(|(profile_id, driver)| BackendInfo {
            profile_id: Some(profile_id),
            name: driver.name().to_string(),
            backend_type: driver.backend_type(),
            cumulative_mb: driver.cumulative_mb(),
            version: driver.version(),
        })
        .collect();
    cached.sort_by_key(|info| info.profile_id);

    Ok(Json(default.into_iter().chain(cached).collect()))
}
