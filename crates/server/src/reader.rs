//! Range-aware read path.

use crate::error::ApiResult;
use crate::policy::DownloadPolicy;
use axum::body::Body;
use axum::http::header::{
    ACCEPT_RANGES, CONTENT_DISPOSITION, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_RANGE,
    CONTENT_TYPE,
};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use depot_core::{FileMeta, parse_range};
use depot_storage::{BackendDriver, ByteReader};
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;

/// An opened read, ready to be turned into a response.
pub struct RangeRead {
    pub reader: ByteReader,
    pub status: StatusCode,
    /// `bytes start-end/total` for partial reads.
    pub content_range: Option<String>,
    /// Length of the served segment. `None` when a policy rewrote the body.
    pub content_length: Option<u64>,
    pub content_encoding: Option<String>,
    pub mime_type: String,
    pub content_disposition: Option<String>,
}

/// Open `file` honouring an optional `Range` header.
///
/// Exactly one satisfiable range yields 206 with the reader positioned at
/// the range start. No header, or several ranges, serves the whole object
/// with 200. Whatever the policy returns is capped at the served length.
/// Ranges lying wholly outside the object fail with
/// [`crate::ApiError::RangeNotSatisfiable`].
pub async fn open_range(
    driver: &dyn BackendDriver,
    policy: &dyn DownloadPolicy,
    file: &FileMeta,
    range: Option<&str>,
) -> ApiResult<RangeRead> {
    let ranges = match range {
        Some(header) => parse_range(header, file.size)?,
        None => Vec::new(),
    };

    let (offset, status, content_range, length) = match ranges.as_slice() {
        [single] => (
            single.start,
            StatusCode::PARTIAL_CONTENT,
            Some(single.content_range(file.size)),
            single.length,
        ),
        _ => (0, StatusCode::OK, None, file.size),
    };

    let reader = driver.open(file, offset).await?;
    let output = policy.transform(file.domain_id, file, reader).await?;
    let content_length = output.content_encoding.is_none().then_some(length);
    let reader: ByteReader = Box::pin(output.reader.take(length));

    Ok(RangeRead {
        reader,
        status,
        content_range,
        content_length,
        content_encoding: output.content_encoding,
        mime_type: file.mime_type.clone(),
        content_disposition: None,
    })
}

impl RangeRead {
    /// Serve as an attachment named `view_name`.
    pub fn attachment(mut self, view_name: &str) -> Self {
        let encoded =
            percent_encoding::utf8_percent_encode(view_name, percent_encoding::NON_ALPHANUMERIC);
        self.content_disposition = Some(format!("attachment; filename*=UTF-8''{encoded}"));
        self
    }
}

impl IntoResponse for RangeRead {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from_stream(ReaderStream::new(self.reader)));
        *response.status_mut() = self.status;

        let headers = response.headers_mut();
        headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        let content_type = HeaderValue::from_str(&self.mime_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
        headers.insert(CONTENT_TYPE, content_type);
        if let Some(range) = self.content_range.and_then(|r| HeaderValue::from_str(&r).ok()) {
            headers.insert(CONTENT_RANGE, range);
        }
        if let Some(length) = self.content_length {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
        }
        if let Some(encoding) = self
            .content_encoding
            .and_then(|e| HeaderValue::from_str(&e).ok())
        {
            headers.insert(CONTENT_ENCODING, encoding);
        }
        if let Some(disposition) = self
            .content_disposition
            .and_then(|d| HeaderValue::from_str(&d).ok())
        {
            headers.insert(CONTENT_DISPOSITION, disposition);
        }
        response
    }
}
