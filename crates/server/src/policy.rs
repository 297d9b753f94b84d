//! Download policy seam.
//!
//! A policy sees every stream the read path hands out and may replace it,
//! e.g. to decrypt or transcode. A policy that changes the byte count must
//! report a content encoding so the response drops its Content-Length.

use crate::error::ApiResult;
use async_trait::async_trait;
use depot_core::FileMeta;
use depot_storage::ByteReader;

/// Stream produced by a policy.
pub struct PolicyOutput {
    pub reader: ByteReader,
    /// Set when the bytes no longer match the stored length.
    pub content_encoding: Option<String>,
}

impl PolicyOutput {
    pub fn unchanged(reader: ByteReader) -> Self {
        Self {
            reader,
            content_encoding: None,
        }
    }
}

#[async_trait]
pub trait DownloadPolicy: Send + Sync + 'static {
    /// Wrap `reader`, which yields bytes of `file` for tenant `domain_id`.
    async fn transform(
        &self,
        domain_id: i64,
        file: &FileMeta,
        reader: ByteReader,
    ) -> ApiResult<PolicyOutput>;
}

/// Hands the stored bytes out unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

#[async_trait]
impl DownloadPolicy for Passthrough {
    async fn transform(
        &self,
        _domain_id: i64,
        _file: &FileMeta,
        reader: ByteReader,
    ) -> ApiResult<PolicyOutput> {
        Ok(PolicyOutput::unchanged(reader))
    }
}
