//! Job-style uploads: bytes land in staging and a worker finishes them.

use crate::error::{ApiError, ApiResult};
use crate::handlers::files::{Ingested, UploadMode, UploadQuery, ingest};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use depot_metadata::models::UploadJobRow;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct UploadJobsResponse {
    pub jobs: Vec<UploadJobRow>,
}

/// POST /v1/domains/{domain}/upload-jobs - Stage uploads for the upload worker.
pub async fn create_upload_jobs(
    State(state): State<AppState>,
    Path(domain_id): Path<i64>,
    Query(query): Query<UploadQuery>,
    req: Request,
) -> ApiResult<(StatusCode, Json<UploadJobsResponse>)> {
    let jobs = ingest(&state, domain_id, query, req, UploadMode::Staged)
        .await?
        .into_iter()
        .filter_map(|item| match item {
            Ingested::Job(job) => Some(job),
            Ingested::File(_) => None,
        })
        .collect();
    Ok((StatusCode::ACCEPTED, Json(UploadJobsResponse { jobs })))
}

/// GET /v1/domains/{domain}/upload-jobs/{id}
///
/// A committed job no longer exists; its file is found by uuid.
pub async fn get_upload_job(
    State(state): State<AppState>,
    Path((domain_id, job_id)): Path<(i64, i64)>,
) -> ApiResult<Json<UploadJobRow>> {
    let job = state
        .metadata
        .get_upload_job(job_id)
        .await?
        .filter(|job| job.domain_id == domain_id)
        .ok_or_else(|| ApiError::NotFound(format!("upload job {job_id}")))?;
    Ok(Json(job))
}
