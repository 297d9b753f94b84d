//! Unauthenticated downloads through signed references.

use crate::error::{ApiError, ApiResult};
use crate::handlers::files::{range_header, serve};
use crate::reader::RangeRead;
use crate::signature::SignatureError;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use serde::Deserialize;
use time::OffsetDateTime;

#[derive(Debug, Deserialize)]
pub struct SharedQuery {
    pub expires: i64,
    pub signature: String,
}

/// GET /v1/shared/{domain}/{id}?expires=&signature=
pub async fn shared_download(
    State(state): State<AppState>,
    Path((domain_id, file_id)): Path<(i64, i64)>,
    Query(query): Query<SharedQuery>,
    headers: HeaderMap,
) -> ApiResult<RangeRead> {
    state
        .signer
        .verify(
            domain_id,
            file_id,
            query.expires,
            &query.signature,
            OffsetDateTime::now_utc(),
        )
        .map_err(|e| match e {
            SignatureError::Expired => ApiError::Forbidden("link expired".to_string()),
            SignatureError::Invalid => ApiError::Forbidden("invalid signature".to_string()),
        })?;

    let file = state
        .metadata
        .get_file_with_profile(domain_id, file_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("file {file_id}")))?;
    let read = serve(&state, &file, range_header(&headers)?).await?;
    Ok(read.attachment(&file.file.view_name))
}
