//! Backend profiles: tenant-scoped storage backend configuration.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;

/// Property key holding a backend's base directory.
pub const PROP_DIRECTORY: &str = "directory";

/// Property key holding a backend's path template.
pub const PROP_PATH_PATTERN: &str = "path_pattern";

/// Bytes per megabyte as used by profile size limits and byte counters.
pub const BYTES_PER_MB: u64 = 1_000_000;

/// Longest expiry a profile or the default store may request, in days.
pub const MAX_EXPIRE_DAY: i32 = 36_500;

/// Largest per-file limit a profile may set, in megabytes.
pub const MAX_SIZE_MB: i64 = 1_000_000_000;

/// Storage technology behind a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// Local disk.
    Local,
}

impl BackendType {
    /// Stable identifier stored in the profile table.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
        }
    }
}

impl FromStr for BackendType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "local" => Ok(Self::Local),
            other => Err(Error::UnknownBackendType(other.to_string())),
        }
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Free-form string-keyed properties attached to profiles and files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties(BTreeMap<String, serde_json::Value>);

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from the JSON text stored in the database. Empty text is an empty map.
    pub fn from_json(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(text).map_err(|e| Error::InvalidProperties(e.to_string()))
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| "{}".to_string())
    }

    /// String value for `key`, if present and a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.as_str())
    }

    pub fn set_str(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0
            .insert(key.into(), serde_json::Value::String(value.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut props = Self::default();
        for (k, v) in iter {
            props.set_str(k, v);
        }
        props
    }
}

/// A tenant's configured storage backend.
///
/// `updated_at` doubles as the version stamp used to invalidate cached
/// backend instances: every update bumps it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendProfile {
    pub id: i64,
    pub domain_id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Ordering among a tenant's profiles, lower first.
    pub priority: i32,
    pub disabled: bool,
    /// Per-file size limit in megabytes, 0 = unlimited.
    pub max_size_mb: i64,
    /// Days after which files expire, 0 = never.
    pub expire_day: i32,
    #[serde(rename = "type")]
    pub backend_type: BackendType,
    pub properties: Properties,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub created_by: Option<i64>,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub updated_by: Option<i64>,
}

impl BackendProfile {
    /// Check business rules before persisting.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidProfile("name is required".to_string()));
        }
        if !(0..=MAX_SIZE_MB).contains(&self.max_size_mb) {
            return Err(Error::InvalidProfile(format!(
                "max_size_mb must be between 0 and {MAX_SIZE_MB}"
            )));
        }
        if !(0..=MAX_EXPIRE_DAY).contains(&self.expire_day) {
            return Err(Error::InvalidProfile(format!(
                "expire_day must be between 0 and {MAX_EXPIRE_DAY}"
            )));
        }
        match self.backend_type {
            BackendType::Local => {
                if self
                    .properties
                    .get_str(PROP_DIRECTORY)
                    .is_none_or(|d| d.trim().is_empty())
                {
                    return Err(Error::InvalidProfile(format!(
                        "local backend requires the '{PROP_DIRECTORY}' property"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Size limit in bytes, if any.
    pub fn max_size_bytes(&self) -> Option<u64> {
        u64::try_from(self.max_size_mb)
            .ok()
            .filter(|mb| *mb > 0)
            .map(|mb| mb.saturating_mul(BYTES_PER_MB))
    }

    /// Apply a partial update.
    pub fn apply_patch(&mut self, patch: ProfilePatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(description) = patch.description {
            self.description = Some(description);
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(disabled) = patch.disabled {
            self.disabled = disabled;
        }
        if let Some(max_size_mb) = patch.max_size_mb {
            self.max_size_mb = max_size_mb;
        }
        if let Some(expire_day) = patch.expire_day {
            self.expire_day = expire_day;
        }
        if let Some(properties) = patch.properties {
            self.properties = properties;
        }
    }
}

/// Partial profile update. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfilePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub priority: Option<i32>,
    pub disabled: Option<bool>,
    pub max_size_mb: Option<i64>,
    pub expire_day: Option<i32>,
    pub properties: Option<Properties>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_profile() -> BackendProfile {
        let now = OffsetDateTime::now_utc();
        BackendProfile {
            id: 1,
            domain_id: 10,
            name: "archive".to_string(),
            description: None,
            priority: 0,
            disabled: false,
            max_size_mb: 0,
            expire_day: 30,
            backend_type: BackendType::Local,
            properties: [(PROP_DIRECTORY, "/srv/archive")].into_iter().collect(),
            created_at: now,
            created_by: None,
            updated_at: now,
            updated_by: None,
        }
    }

    #[test]
    fn backend_type_roundtrips_through_str() {
        assert_eq!("local".parse::<BackendType>().unwrap(), BackendType::Local);
        assert!(matches!(
            "s3".parse::<BackendType>(),
            Err(Error::UnknownBackendType(t)) if t == "s3"
        ));
    }

    #[test]
    fn local_profile_requires_directory() {
        let mut profile = local_profile();
        assert!(profile.validate().is_ok());

        profile.properties = Properties::new();
        assert!(matches!(profile.validate(), Err(Error::InvalidProfile(_))));
    }

    #[test]
    fn negative_limits_are_rejected() {
        let mut profile = local_profile();
        profile.expire_day = -1;
        assert!(profile.validate().is_err());
    }

    #[test]
    fn oversized_limits_are_rejected() {
        let mut profile = local_profile();
        profile.expire_day = MAX_EXPIRE_DAY;
        assert!(profile.validate().is_ok());
        profile.expire_day = 5_000_000;
        assert!(matches!(profile.validate(), Err(Error::InvalidProfile(_))));

        let mut profile = local_profile();
        profile.max_size_mb = MAX_SIZE_MB + 1;
        assert!(matches!(profile.validate(), Err(Error::InvalidProfile(_))));
    }

    #[test]
    fn patch_only_touches_given_fields() {
        let mut profile = local_profile();
        profile.apply_patch(ProfilePatch {
            disabled: Some(true),
            expire_day: Some(7),
            ..Default::default()
        });
        assert!(profile.disabled);
        assert_eq!(profile.expire_day, 7);
        assert_eq!(profile.name, "archive");
        assert_eq!(profile.properties.get_str(PROP_DIRECTORY), Some("/srv/archive"));
    }

    #[test]
    fn max_size_is_reported_in_bytes() {
        let mut profile = local_profile();
        assert_eq!(profile.max_size_bytes(), None);
        profile.max_size_mb = 5;
        assert_eq!(profile.max_size_bytes(), Some(5_000_000));

        // Rows written before validation was tightened must not overflow.
        profile.max_size_mb = 100_000_000_000_000;
        assert_eq!(profile.max_size_bytes(), Some(u64::MAX));
        profile.max_size_mb = -3;
        assert_eq!(profile.max_size_bytes(), None);
    }

    #[test]
    fn properties_parse_from_stored_json() {
        let props = Properties::from_json(r#"{"directory":"2024/3/7","n":1}"#).unwrap();
        assert_eq!(props.get_str("directory"), Some("2024/3/7"));
        assert_eq!(props.get_str("n"), None);
        assert!(Properties::from_json("").unwrap().is_empty());
        assert!(Properties::from_json("not json").is_err());
    }
}
