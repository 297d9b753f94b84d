//! File metadata handed to storage backends and download policies.

use crate::profile::Properties;
use serde::{Deserialize, Serialize};

/// The parts of a file record a backend needs to locate its bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMeta {
    /// Tenant owning the file.
    pub domain_id: i64,
    /// Generated storage name, unique per logical upload.
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    /// Backend-specific location data, e.g. the expanded directory.
    pub properties: Properties,
}

impl FileMeta {
    pub fn new(domain_id: i64, name: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            domain_id,
            name: name.into(),
            mime_type: mime_type.into(),
            size: 0,
            properties: Properties::new(),
        }
    }
}

/// Build the storage name for an upload: a fresh id joined to the display name.
///
/// The generated prefix keeps names unique across uploads while retries of the
/// same logical upload reuse the name they were first given.
pub fn storage_name(id: &str, display_name: &str) -> String {
    let display: String = display_name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect();
    format!("{id}_{display}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_name_prefixes_id() {
        assert_eq!(storage_name("abc", "report.pdf"), "abc_report.pdf");
    }

    #[test]
    fn storage_name_strips_separators() {
        assert_eq!(storage_name("abc", "../etc/passwd"), "abc_.._etc_passwd");
    }
}
