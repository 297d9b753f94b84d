//! File upload, listing, removal and download handlers.

use crate::error::{ApiError, ApiResult};
use crate::pipeline::NewFile;
use crate::reader::{RangeRead, open_range};
use crate::state::AppState;
use axum::Json;
use axum::body::Bytes;
use axum::extract::multipart::Field;
use axum::extract::{FromRequest, Multipart, Path, Query, Request, State};
use axum::http::StatusCode;
use axum::http::header::{CONTENT_TYPE, RANGE};
use axum::http::HeaderMap;
use depot_metadata::models::{FileRow, FileWithProfileRow, Page, SearchParams, UploadJobRow};
use depot_storage::{ByteStream, StorageError, StorageResult};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::mpsc;

const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Query parameters accepted by both upload endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct UploadQuery {
    /// Display name for raw-body uploads.
    pub name: Option<String>,
    pub profile_id: Option<i64>,
    pub uuid: Option<String>,
}

/// One accepted upload.
#[derive(Debug, Serialize)]
pub struct UploadedFile {
    pub id: i64,
    pub uuid: String,
    pub name: String,
    pub size: i64,
    pub mime_type: String,
    pub profile_id: Option<i64>,
    /// Signed retrieval reference.
    pub shared: String,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub files: Vec<UploadedFile>,
}

/// Where an upload goes once its bytes arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UploadMode {
    Direct,
    Staged,
}

pub(crate) enum Ingested {
    File(FileRow),
    Job(UploadJobRow),
}

/// POST /v1/domains/{domain}/files - Upload synchronously.
///
/// Accepts `multipart/form-data` (one entry per file part) or a raw body
/// named by `?name=`.
pub async fn upload_files(
    State(state): State<AppState>,
    Path(domain_id): Path<i64>,
    Query(query): Query<UploadQuery>,
    req: Request,
) -> ApiResult<(StatusCode, Json<UploadResponse>)> {
    let ingested = ingest(&state, domain_id, query, req, UploadMode::Direct).await?;
    let now = OffsetDateTime::now_utc();
    let files = ingested
        .into_iter()
        .filter_map(|item| match item {
            Ingested::File(row) => Some(row),
            Ingested::Job(_) => None,
        })
        .map(|row| UploadedFile {
            shared: state.signer.shared_url(row.domain_id, row.id, now),
            id: row.id,
            uuid: row.uuid,
            name: row.view_name,
            size: row.size,
            mime_type: row.mime_type,
            profile_id: row.profile_id,
        })
        .collect();
    Ok((StatusCode::CREATED, Json(UploadResponse { files })))
}

/// Read every upload in the request and hand it to the pipeline.
pub(crate) async fn ingest(
    state: &AppState,
    domain_id: i64,
    query: UploadQuery,
    req: Request,
    mode: UploadMode,
) -> ApiResult<Vec<Ingested>> {
    let is_multipart = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"));

    if !is_multipart {
        let view_name = query
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ApiError::BadRequest("missing 'name' query parameter".to_string()))?;
        let mime_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(DEFAULT_MIME_TYPE)
            .to_string();
        let file = new_file(domain_id, &query, view_name, mime_type);
        let body: ByteStream = Box::pin(
            req.into_body()
                .into_data_stream()
                .map(|chunk| chunk.map_err(|e| StorageError::Source(e.to_string()))),
        );
        return Ok(vec![ingest_one(state, mode, file, body).await?]);
    }

    let mut multipart = Multipart::from_request(req, state)
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let mut ingested = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        let Some(view_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let mime_type = field
            .content_type()
            .unwrap_or(DEFAULT_MIME_TYPE)
            .to_string();
        let file = new_file(domain_id, &query, view_name, mime_type);

        // The part borrows the multipart reader, so it is pumped into a
        // channel that the pipeline consumes concurrently.
        let (tx, mut rx) = mpsc::channel::<StorageResult<Bytes>>(4);
        let body: ByteStream = Box::pin(async_stream::stream! {
            while let Some(chunk) = rx.recv().await {
                yield chunk;
            }
        });
        let (stored, ()) = tokio::join!(ingest_one(state, mode, file, body), pump(field, tx));
        ingested.push(stored?);
    }

    if ingested.is_empty() {
        return Err(ApiError::BadRequest(
            "multipart body contains no file parts".to_string(),
        ));
    }
    Ok(ingested)
}

async fn pump(mut field: Field<'_>, tx: mpsc::Sender<StorageResult<Bytes>>) {
    loop {
        match field.chunk().await {
            Ok(Some(chunk)) => {
                if tx.send(Ok(chunk)).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                let _ = tx.send(Err(StorageError::Source(e.body_text()))).await;
                break;
            }
        }
    }
}

fn new_file(domain_id: i64, query: &UploadQuery, view_name: String, mime_type: String) -> NewFile {
    NewFile {
        domain_id,
        view_name,
        mime_type,
        uuid: query.uuid.clone(),
        profile_id: query.profile_id,
    }
}

async fn ingest_one(
    state: &AppState,
    mode: UploadMode,
    file: NewFile,
    body: ByteStream,
) -> ApiResult<Ingested> {
    match mode {
        UploadMode::Direct => state.pipeline.store(file, body).await.map(Ingested::File),
        UploadMode::Staged => state.pipeline.stage(file, body).await.map(Ingested::Job),
    }
}

/// Paging parameters shared by list endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub q: Option<String>,
}

impl ListQuery {
    pub fn search_params(&self) -> SearchParams {
        let mut params = SearchParams::new(
            self.page.unwrap_or(1),
            self.per_page.unwrap_or(SearchParams::DEFAULT_PER_PAGE),
        );
        params.q = self.q.clone();
        params
    }
}

/// GET /v1/domains/{domain}/files - List live files.
pub async fn list_files(
    State(state): State<AppState>,
    Path(domain_id): Path<i64>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Page<FileRow>>> {
    let page = state
        .metadata
        .list_files(domain_id, &query.search_params())
        .await?;
    Ok(Json(page))
}

#[derive(Debug, Deserialize)]
pub struct DeleteFilesRequest {
    pub ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct DeleteFilesResponse {
    pub removed: u64,
}

/// DELETE /v1/domains/{domain}/files - Soft delete.
///
/// Stored bytes are removed later by the job consumer.
pub async fn delete_files(
    State(state): State<AppState>,
    Path(domain_id): Path<i64>,
    Json(request): Json<DeleteFilesRequest>,
) -> ApiResult<Json<DeleteFilesResponse>> {
    if request.ids.is_empty() {
        return Err(ApiError::BadRequest("ids cannot be empty".to_string()));
    }
    let removed = state
        .metadata
        .mark_removed(domain_id, &request.ids, OffsetDateTime::now_utc())
        .await?;
    tracing::info!(domain_id, removed, "files marked removed");
    Ok(Json(DeleteFilesResponse { removed }))
}

/// GET /v1/domains/{domain}/files/{id}/stream - Stream with Range support.
pub async fn stream_file(
    State(state): State<AppState>,
    Path((domain_id, file_id)): Path<(i64, i64)>,
    headers: HeaderMap,
) -> ApiResult<RangeRead> {
    let file = state
        .metadata
        .get_file_with_profile(domain_id, file_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("file {file_id}")))?;
    serve(&state, &file, range_header(&headers)?).await
}

/// GET /v1/domains/{domain}/files/{id}/download - Full body as an attachment.
pub async fn download_file(
    State(state): State<AppState>,
    Path((domain_id, file_id)): Path<(i64, i64)>,
) -> ApiResult<RangeRead> {
    let file = state
        .metadata
        .get_file_with_profile(domain_id, file_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("file {file_id}")))?;
    let read = serve(&state, &file, None).await?;
    Ok(read.attachment(&file.file.view_name))
}

/// GET /v1/domains/{domain}/files/by-uuid/{uuid}/stream
pub async fn stream_file_by_uuid(
    State(state): State<AppState>,
    Path((domain_id, uuid)): Path<(i64, String)>,
    headers: HeaderMap,
) -> ApiResult<RangeRead> {
    let file = state
        .metadata
        .get_file_by_uuid_with_profile(domain_id, &uuid)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("file {uuid}")))?;
    serve(&state, &file, range_header(&headers)?).await
}

pub(crate) fn range_header(headers: &HeaderMap) -> ApiResult<Option<&str>> {
    headers
        .get(RANGE)
        .map(|v| {
            v.to_str()
                .map_err(|_| ApiError::BadRequest("invalid Range header".to_string()))
        })
        .transpose()
}

/// Resolve the file's backend and open it.
pub(crate) async fn serve(
    state: &AppState,
    file: &FileWithProfileRow,
    range: Option<&str>,
) -> ApiResult<RangeRead> {
    let driver = state
        .resolver
        .resolve(file.file.profile_id, file.profile_updated_at)
        .await?;
    let meta = file.file.meta()?;
    open_range(driver.as_ref(), state.policy.as_ref(), &meta, range).await
}
