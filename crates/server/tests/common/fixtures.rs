//! Test fixtures for generating test data.

use axum::body::Bytes;
use depot_core::{BackendProfile, BackendType, PROP_DIRECTORY, PROP_PATH_PATTERN, Properties};
use depot_metadata::models::FileRow;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use time::{Duration, OffsetDateTime};

/// Counter for generating unique storage names.
static NAME_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generate deterministic test data based on a seed.
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    for chunk in data.chunks_mut(8) {
        // Simple LCG for deterministic data
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

/// A fixed instant with whole seconds, so stored timestamps compare exactly.
#[allow(dead_code)]
pub fn fixed_now() -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(1_760_000_000).expect("valid timestamp")
}

/// Build a local profile rooted at `directory`. `id` is assigned on create.
#[allow(dead_code)]
pub fn local_profile(domain_id: i64, name: &str, directory: &Path, expire_day: i32) -> BackendProfile {
    let now = fixed_now();
    let properties: Properties = [
        (PROP_DIRECTORY, directory.to_string_lossy().to_string()),
        (PROP_PATH_PATTERN, "$DOMAIN".to_string()),
    ]
    .into_iter()
    .collect();
    BackendProfile {
        id: 0,
        domain_id,
        name: name.to_string(),
        description: None,
        priority: 0,
        disabled: false,
        max_size_mb: 0,
        expire_day,
        backend_type: BackendType::Local,
        properties,
        created_at: now,
        created_by: None,
        updated_at: now,
        updated_by: None,
    }
}

/// A file row created `age` before `now`. `id` is assigned on create.
#[allow(dead_code)]
pub fn file_row(
    domain_id: i64,
    profile_id: Option<i64>,
    now: OffsetDateTime,
    age: Duration,
) -> FileRow {
    let n = NAME_COUNTER.fetch_add(1, Ordering::Relaxed);
    let created_at = now - age;
    FileRow {
        id: 0,
        domain_id,
        uuid: format!("uuid-{n}"),
        name: format!("{n:032x}_file-{n}.bin"),
        view_name: format!("file-{n}.bin"),
        size: 10,
        mime_type: "application/octet-stream".to_string(),
        properties: "{}".to_string(),
        profile_id,
        instance: "test".to_string(),
        removed: false,
        created_at,
        updated_at: created_at,
    }
}
