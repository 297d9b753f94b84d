//! Database models mapping to the metadata schema.

use crate::error::{MetadataError, MetadataResult};
use depot_core::{BackendProfile, FileMeta, Properties};
use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;

// =============================================================================
// Backend profiles
// =============================================================================

/// Backend profile record. `properties` is stored as JSON text.
#[derive(Debug, Clone, FromRow)]
pub struct ProfileRow {
    pub id: i64,
    pub domain_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub priority: i32,
    pub disabled: bool,
    pub max_size_mb: i64,
    pub expire_day: i32,
    pub backend_type: String,
    pub properties: String,
    pub created_at: OffsetDateTime,
    pub created_by: Option<i64>,
    pub updated_at: OffsetDateTime,
    pub updated_by: Option<i64>,
}

impl ProfileRow {
    pub fn into_profile(self) -> MetadataResult<BackendProfile> {
        Ok(BackendProfile {
            id: self.id,
            domain_id: self.domain_id,
            name: self.name,
            description: self.description,
            priority: self.priority,
            disabled: self.disabled,
            max_size_mb: self.max_size_mb,
            expire_day: self.expire_day,
            backend_type: self.backend_type.parse()?,
            properties: Properties::from_json(&self.properties)?,
            created_at: self.created_at,
            created_by: self.created_by,
            updated_at: self.updated_at,
            updated_by: self.updated_by,
        })
    }
}

pub(crate) fn into_profiles(rows: Vec<ProfileRow>) -> MetadataResult<Vec<BackendProfile>> {
    rows.into_iter().map(ProfileRow::into_profile).collect()
}

/// Access bits held by a grant on a profile.
pub mod access {
    pub const READ: i32 = 1;
    pub const WRITE: i32 = 2;
    pub const DELETE: i32 = 4;
    pub const ALL: i32 = READ | WRITE | DELETE;
}

/// Grant of access bits on a profile to a subject (user or group id).
#[derive(Debug, Clone, FromRow)]
pub struct ProfileGrantRow {
    pub profile_id: i64,
    pub subject: i64,
    pub access: i32,
}

// =============================================================================
// Files
// =============================================================================

/// File record. `name` is the generated storage name; `view_name` is what
/// the uploader called it.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct FileRow {
    pub id: i64,
    pub domain_id: i64,
    pub uuid: String,
    pub name: String,
    pub view_name: String,
    pub size: i64,
    pub mime_type: String,
    pub properties: String,
    pub profile_id: Option<i64>,
    pub instance: String,
    pub removed: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl FileRow {
    /// The parts a backend needs to locate the stored bytes.
    pub fn meta(&self) -> MetadataResult<FileMeta> {
        Ok(FileMeta {
            domain_id: self.domain_id,
            name: self.name.clone(),
            mime_type: self.mime_type.clone(),
            size: non_negative(self.size)?,
            properties: Properties::from_json(&self.properties)?,
        })
    }
}

/// File joined with its owning profile's version stamp.
#[derive(Debug, Clone, FromRow)]
pub struct FileWithProfileRow {
    #[sqlx(flatten)]
    pub file: FileRow,
    /// `None` when the file lives in the default store.
    pub profile_updated_at: Option<OffsetDateTime>,
}

// =============================================================================
// Sync jobs
// =============================================================================

/// Lifecycle job against a single file.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SyncJobRow {
    pub id: i64,
    pub file_id: i64,
    pub action: String,
    pub config: Option<String>,
    pub state: String,
    pub error: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// A job returned by a claim, materialised with everything needed to run it.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ClaimedJobRow {
    pub id: i64,
    pub file_id: i64,
    pub action: String,
    pub config: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub domain_id: i64,
    pub name: String,
    pub size: i64,
    pub mime_type: String,
    pub properties: String,
    pub instance: String,
    pub profile_id: Option<i64>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub profile_updated_at: Option<OffsetDateTime>,
}

impl ClaimedJobRow {
    pub fn meta(&self) -> MetadataResult<FileMeta> {
        Ok(FileMeta {
            domain_id: self.domain_id,
            name: self.name.clone(),
            mime_type: self.mime_type.clone(),
            size: non_negative(self.size)?,
            properties: Properties::from_json(&self.properties)?,
        })
    }
}

// =============================================================================
// Upload jobs (staging)
// =============================================================================

/// Staged upload waiting to be written to its backend.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UploadJobRow {
    pub id: i64,
    pub domain_id: i64,
    pub uuid: String,
    pub name: String,
    pub view_name: String,
    pub mime_type: String,
    pub size: i64,
    /// Staging-side location data recorded by the staging driver.
    pub properties: String,
    pub profile_id: Option<i64>,
    pub instance: String,
    pub state: String,
    pub error: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl UploadJobRow {
    /// Location of the staged artifact.
    pub fn staged_meta(&self) -> MetadataResult<FileMeta> {
        Ok(FileMeta {
            domain_id: self.domain_id,
            name: self.name.clone(),
            mime_type: self.mime_type.clone(),
            size: non_negative(self.size)?,
            properties: Properties::from_json(&self.properties)?,
        })
    }
}

// =============================================================================
// Paging
// =============================================================================

/// Page request shared by list operations. Pages are 1-based.
#[derive(Debug, Clone)]
pub struct SearchParams {
    pub page: u32,
    pub per_page: u32,
    /// Case-sensitive name substring filter.
    pub q: Option<String>,
}

impl SearchParams {
    pub const DEFAULT_PER_PAGE: u32 = 40;
    pub const MAX_PER_PAGE: u32 = 1000;

    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page,
            per_page,
            q: None,
        }
    }

    pub fn with_query(mut self, q: impl Into<String>) -> Self {
        self.q = Some(q.into());
        self
    }

    fn per_page_clamped(&self) -> u32 {
        match self.per_page {
            0 => Self::DEFAULT_PER_PAGE,
            n => n.min(Self::MAX_PER_PAGE),
        }
    }

    /// Rows to fetch: one more than a page, to detect a following page.
    pub fn fetch_limit(&self) -> i64 {
        i64::from(self.per_page_clamped()) + 1
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page.max(1) - 1) * i64::from(self.per_page_clamped())
    }

    /// `LIKE` pattern for the name filter, if any.
    pub(crate) fn like_pattern(&self) -> Option<String> {
        self.q
            .as_deref()
            .filter(|q| !q.is_empty())
            .map(|q| format!("%{q}%"))
    }

    /// Trim an over-fetched row set into a page.
    pub(crate) fn into_page<T>(&self, mut items: Vec<T>) -> Page<T> {
        let per_page = self.per_page_clamped() as usize;
        let next = items.len() > per_page;
        items.truncate(per_page);
        Page { items, next }
    }
}

impl Default for SearchParams {
    fn default() -> Self {
        Self::new(1, Self::DEFAULT_PER_PAGE)
    }
}

/// One page of results.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// True if another page follows.
    pub next: bool,
}

fn non_negative(size: i64) -> MetadataResult<u64> {
    u64::try_from(size).map_err(|_| MetadataError::InvalidData(format!("negative size {size}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paging_overfetches_by_one() {
        let params = SearchParams::new(3, 10);
        assert_eq!(params.fetch_limit(), 11);
        assert_eq!(params.offset(), 20);

        let page = params.into_page((0..11).collect::<Vec<_>>());
        assert!(page.next);
        assert_eq!(page.items.len(), 10);

        let page = params.into_page((0..4).collect::<Vec<_>>());
        assert!(!page.next);
    }

    #[test]
    fn zero_page_is_first_page() {
        let params = SearchParams::new(0, 0);
        assert_eq!(params.offset(), 0);
        assert_eq!(params.fetch_limit(), i64::from(SearchParams::DEFAULT_PER_PAGE) + 1);
    }

    #[test]
    fn empty_query_is_no_filter() {
        assert_eq!(SearchParams::default().with_query("").like_pattern(), None);
        assert_eq!(
            SearchParams::default().with_query("arc").like_pattern().as_deref(),
            Some("%arc%")
        );
    }

    #[test]
    fn file_meta_rejects_negative_size() {
        let now = OffsetDateTime::now_utc();
        let row = FileRow {
            id: 1,
            domain_id: 1,
            uuid: "u".to_string(),
            name: "n".to_string(),
            view_name: "n".to_string(),
            size: -1,
            mime_type: "text/plain".to_string(),
            properties: "{}".to_string(),
            profile_id: None,
            instance: "i".to_string(),
            removed: false,
            created_at: now,
            updated_at: now,
        };
        assert!(matches!(row.meta(), Err(MetadataError::InvalidData(_))));
    }
}
