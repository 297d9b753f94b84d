//! Configuration types shared across crates.

use crate::profile::MAX_EXPIRE_DAY;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum accepted upload size in bytes. Uploads are aborted as soon as
    /// the body exceeds it.
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: u64,
    /// Identifier recorded on every file this process writes.
    /// Defaults to `$HOSTNAME`, then to a random id generated at startup.
    #[serde(default)]
    pub instance_id: Option<String>,
    /// Request body limit for non-upload routes, in bytes.
    #[serde(default = "default_body_limit")]
    pub body_limit: usize,
}

fn default_bind() -> String {
    "127.0.0.1:10023".to_string()
}

fn default_max_upload_size() -> u64 {
    100 * 1024 * 1024 // 100 MiB
}

fn default_body_limit() -> usize {
    1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_upload_size: default_max_upload_size(),
            instance_id: None,
            body_limit: default_body_limit(),
        }
    }
}

/// Process-wide default store used for files without a profile.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DefaultStoreConfig {
    /// Local disk.
    Local {
        /// Base directory.
        directory: PathBuf,
        /// Relative path template, see `depot_core::pattern`.
        #[serde(default = "default_path_pattern")]
        path_pattern: String,
        /// Days after which default-store files expire, 0 = never.
        #[serde(default)]
        expire_day: u32,
    },
}

fn default_path_pattern() -> String {
    "$DOMAIN/$Y/$M/$D".to_string()
}

impl DefaultStoreConfig {
    /// Expiry window of the default store in days, 0 = never.
    pub fn expire_day(&self) -> u32 {
        match self {
            Self::Local { expire_day, .. } => *expire_day,
        }
    }

    /// Validate default store invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Local {
                directory,
                path_pattern,
                expire_day,
            } => {
                if directory.as_os_str().is_empty() {
                    return Err("default_store.directory must not be empty".to_string());
                }
                if i64::from(*expire_day) > i64::from(MAX_EXPIRE_DAY) {
                    return Err(format!(
                        "default_store.expire_day cannot exceed {MAX_EXPIRE_DAY}"
                    ));
                }
                if path_pattern.starts_with('/') {
                    return Err("default_store.path_pattern must be relative".to_string());
                }
                Ok(())
            }
        }
    }
}

impl Default for DefaultStoreConfig {
    fn default() -> Self {
        Self::Local {
            directory: PathBuf::from("./data/files"),
            path_pattern: default_path_pattern(),
            expire_day: 0,
        }
    }
}

/// Local staging area for job-style uploads.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StagingConfig {
    #[serde(default = "default_staging_directory")]
    pub directory: PathBuf,
}

fn default_staging_directory() -> PathBuf {
    PathBuf::from("./data/staging")
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            directory: default_staging_directory(),
        }
    }
}

/// PostgreSQL SSL mode configuration.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PgSslMode {
    Disable,
    #[default]
    Prefer,
    Require,
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database. Suitable for a single process; job claiming across
    /// several processes needs PostgreSQL.
    Sqlite {
        /// Database file path.
        path: PathBuf,
    },
    /// PostgreSQL database.
    Postgres {
        /// Connection URL. Takes precedence over the individual fields.
        url: Option<String>,
        host: Option<String>,
        #[serde(default = "default_pg_port")]
        port: Option<u16>,
        username: Option<String>,
        /// Prefer DEPOT_METADATA__PASSWORD over storing this in a file.
        password: Option<String>,
        database: Option<String>,
        ssl_mode: Option<PgSslMode>,
        #[serde(default = "default_max_connections")]
        max_connections: u32,
        /// Server-side statement timeout in milliseconds.
        #[serde(default = "default_statement_timeout_ms")]
        statement_timeout_ms: Option<u64>,
    },
}

fn default_max_connections() -> u32 {
    10
}

fn default_pg_port() -> Option<u16> {
    Some(5432)
}

fn default_statement_timeout_ms() -> Option<u64> {
    Some(60_000)
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/metadata.db"),
        }
    }
}

impl MetadataConfig {
    /// Validate metadata configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            MetadataConfig::Sqlite { .. } => Ok(()),
            MetadataConfig::Postgres {
                url,
                host,
                database,
                ..
            } => match (url.as_ref(), host.as_ref(), database.as_ref()) {
                (Some(_), _, _) | (None, Some(_), Some(_)) => Ok(()),
                (None, None, _) => Err(
                    "postgres config requires either 'url' or 'host' + 'database'".to_string(),
                ),
                (None, Some(_), None) => Err(
                    "postgres config requires 'database' when using individual fields"
                        .to_string(),
                ),
            },
        }
    }
}

/// Background job scheduling.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Run the producer, consumer and purge loops in this process.
    #[serde(default = "default_scheduler_enabled")]
    pub enabled: bool,
    /// Seconds between removal-job enqueue runs.
    #[serde(default = "default_producer_interval_secs")]
    pub producer_interval_secs: u64,
    /// Seconds between job claim/execute runs.
    #[serde(default = "default_consumer_interval_secs")]
    pub consumer_interval_secs: u64,
    /// Seconds between purges of failed jobs.
    #[serde(default = "default_purge_interval_secs")]
    pub purge_interval_secs: u64,
    /// Seconds between staged upload processing runs.
    #[serde(default = "default_upload_interval_secs")]
    pub upload_interval_secs: u64,
    /// Jobs claimed per consumer run.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Age in seconds after which failed jobs are purged and become
    /// eligible for re-enqueue.
    #[serde(default = "default_error_retention_secs")]
    pub error_retention_secs: u64,
}

fn default_scheduler_enabled() -> bool {
    true
}

fn default_producer_interval_secs() -> u64 {
    60
}

fn default_consumer_interval_secs() -> u64 {
    5
}

fn default_purge_interval_secs() -> u64 {
    600
}

fn default_upload_interval_secs() -> u64 {
    5
}

fn default_batch_size() -> u32 {
    100
}

fn default_error_retention_secs() -> u64 {
    3600 // 1 hour
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: default_scheduler_enabled(),
            producer_interval_secs: default_producer_interval_secs(),
            consumer_interval_secs: default_consumer_interval_secs(),
            purge_interval_secs: default_purge_interval_secs(),
            upload_interval_secs: default_upload_interval_secs(),
            batch_size: default_batch_size(),
            error_retention_secs: default_error_retention_secs(),
        }
    }
}

impl SchedulerConfig {
    pub fn producer_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.producer_interval_secs)
    }

    pub fn consumer_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.consumer_interval_secs)
    }

    pub fn purge_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.purge_interval_secs)
    }

    pub fn upload_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.upload_interval_secs)
    }

    /// Failed-job retention as a `time::Duration`.
    pub fn error_retention(&self) -> time::Duration {
        time::Duration::seconds(i64::try_from(self.error_retention_secs).unwrap_or(i64::MAX))
    }

    /// Reject settings that would panic the timers or never make progress.
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("producer_interval_secs", self.producer_interval_secs),
            ("consumer_interval_secs", self.consumer_interval_secs),
            ("purge_interval_secs", self.purge_interval_secs),
            ("upload_interval_secs", self.upload_interval_secs),
        ] {
            if value == 0 {
                return Err(format!("scheduler.{name} cannot be 0"));
            }
        }
        if self.batch_size == 0 {
            return Err("scheduler.batch_size cannot be 0".to_string());
        }
        if self.error_retention_secs > i64::MAX as u64 {
            return Err(format!(
                "scheduler.error_retention_secs {} exceeds maximum value {}",
                self.error_retention_secs,
                i64::MAX
            ));
        }
        Ok(())
    }
}

/// Admin token configuration for the background endpoints.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdminConfig {
    /// SHA256 hex of the admin bearer token.
    /// Generate with: `echo -n "your-secret-token" | sha256sum`
    pub token_hash: String,
}

impl AdminConfig {
    /// **For testing only.** SHA256 of "test-admin-token".
    pub fn for_testing() -> Self {
        Self {
            token_hash: "17d6bfe05d1b1fb7bc499f8e3f639c7b3eda4c40f321eef8887a0c04c89a99c5"
                .to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.token_hash.len() != 64 || !self.token_hash.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return Err("admin.token_hash must be a 64 character SHA256 hex digest".to_string());
        }
        Ok(())
    }
}

/// Signing of shared download links.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SigningConfig {
    /// HMAC secret. Prefer DEPOT_SIGNING__SECRET over storing it in a file.
    pub secret: String,
    /// Lifetime of generated links in seconds.
    #[serde(default = "default_link_ttl_secs")]
    pub link_ttl_secs: u64,
}

fn default_link_ttl_secs() -> u64 {
    7 * 24 * 3600
}

impl SigningConfig {
    /// **For testing only.**
    pub fn for_testing() -> Self {
        Self {
            secret: "test-signing-secret".to_string(),
            link_ttl_secs: default_link_ttl_secs(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.secret.len() < 16 {
            return Err("signing.secret must be at least 16 bytes".to_string());
        }
        Ok(())
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    /// Default store; when absent, every upload must name a profile.
    #[serde(default)]
    pub default_store: Option<DefaultStoreConfig>,
    #[serde(default)]
    pub staging: StagingConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Admin token configuration (required).
    pub admin: AdminConfig,
    /// Link signing (required).
    pub signing: SigningConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Background loops are disabled so tests drive
    /// the scheduler explicitly.
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig::default(),
            default_store: Some(DefaultStoreConfig::default()),
            staging: StagingConfig::default(),
            metadata: MetadataConfig::default(),
            scheduler: SchedulerConfig {
                enabled: false,
                ..SchedulerConfig::default()
            },
            admin: AdminConfig::for_testing(),
            signing: SigningConfig::for_testing(),
        }
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(store) = &self.default_store {
            store.validate()?;
        }
        self.metadata.validate()?;
        self.scheduler.validate()?;
        self.admin.validate()?;
        self.signing.validate()?;
        if self.server.max_upload_size == 0 {
            return Err("server.max_upload_size cannot be 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduler_defaults_match_error_window() {
        let config = SchedulerConfig::default();
        assert_eq!(config.error_retention(), time::Duration::hours(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn scheduler_rejects_zero_interval() {
        let config = SchedulerConfig {
            consumer_interval_secs: 0,
            ..SchedulerConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.contains("consumer_interval_secs"));
    }

    #[test]
    fn default_store_deserializes_with_defaults() {
        let json = r#"{"type": "local", "directory": "/srv/files"}"#;
        let config: DefaultStoreConfig = serde_json::from_str(json).unwrap();
        match &config {
            DefaultStoreConfig::Local {
                directory,
                path_pattern,
                expire_day,
            } => {
                assert_eq!(directory, &PathBuf::from("/srv/files"));
                assert_eq!(path_pattern, "$DOMAIN/$Y/$M/$D");
                assert_eq!(*expire_day, 0);
            }
        }
    }

    #[test]
    fn default_store_rejects_absolute_pattern() {
        let config = DefaultStoreConfig::Local {
            directory: PathBuf::from("/srv"),
            path_pattern: "/abs/$Y".to_string(),
            expire_day: 0,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_store_rejects_unbounded_expiry() {
        let config = DefaultStoreConfig::Local {
            directory: PathBuf::from("/srv"),
            path_pattern: default_path_pattern(),
            expire_day: 5_000_000,
        };
        let err = config.validate().unwrap_err();
        assert!(err.contains("expire_day"));
    }

    #[test]
    fn postgres_requires_url_or_host_and_database() {
        let config: MetadataConfig =
            serde_json::from_str(r#"{"type": "postgres", "host": "db"}"#).unwrap();
        assert!(config.validate().is_err());

        let config: MetadataConfig =
            serde_json::from_str(r#"{"type": "postgres", "url": "postgres://db/depot"}"#).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn testing_config_is_valid() {
        assert!(AppConfig::for_testing().validate().is_ok());
    }

    #[test]
    fn admin_hash_must_be_hex_digest() {
        let config = AdminConfig {
            token_hash: "not-a-hash".to_string(),
        };
        assert!(config.validate().is_err());
    }
}
