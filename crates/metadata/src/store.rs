//! Metadata store trait and implementations.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{FileRepo, ProfileRepo, SyncJobRepo, UploadJobRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: ProfileRepo + FileRepo + SyncJobRepo + UploadJobRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
///
/// Writers are serialised through a single connection, which is what makes
/// job claiming disjoint within one process. Several processes sharing a
/// job queue need [`crate::PostgresStore`].
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub async fn new(path: impl AsRef<Path>) -> MetadataResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// `?, ?, ?` for a dynamic `IN` list.
fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

// Timestamps are stored as RFC 3339 text, whose fractional seconds do not
// sort lexically. Comparisons and ordering go through julianday().
mod sqlite_impl {
    use super::*;
    use crate::error::{is_foreign_key_violation, is_unique_violation};
    use crate::models::*;
    use crate::repos::{ENQUEUE_BATCH_LIMIT, JobAction, expiry_cutoff};
    use depot_core::BackendProfile;
    use time::OffsetDateTime;

    const CLAIMED_JOB_SELECT: &str = r#"
        SELECT j.id, j.file_id, j.action, j.config, j.created_at,
               f.domain_id, f.name, f.size, f.mime_type, f.properties, f.instance, f.profile_id,
               p.updated_at AS profile_updated_at
        FROM sync_jobs j
        JOIN files f ON f.id = j.file_id
        LEFT JOIN backend_profiles p ON p.id = f.profile_id
    "#;

    const FILE_WITH_PROFILE_SELECT: &str = r#"
        SELECT f.*, p.updated_at AS profile_updated_at
        FROM files f
        LEFT JOIN backend_profiles p ON p.id = f.profile_id
    "#;

    #[async_trait]
    impl ProfileRepo for SqliteStore {
        async fn create_profile(&self, profile: &BackendProfile) -> MetadataResult<i64> {
            let result = sqlx::query_scalar::<_, i64>(
                r#"
                INSERT INTO backend_profiles (
                    domain_id, name, description, priority, disabled, max_size_mb, expire_day,
                    backend_type, properties, created_at, created_by, updated_at, updated_by
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                RETURNING id
                "#,
            )
            .bind(profile.domain_id)
            .bind(&profile.name)
            .bind(&profile.description)
            .bind(profile.priority)
            .bind(profile.disabled)
            .bind(profile.max_size_mb)
            .bind(profile.expire_day)
            .bind(profile.backend_type.as_str())
            .bind(profile.properties.to_json())
            .bind(profile.created_at)
            .bind(profile.created_by)
            .bind(profile.updated_at)
            .bind(profile.updated_by)
            .fetch_one(&self.pool)
            .await;

            match result {
                Ok(id) => Ok(id),
                Err(e) if is_unique_violation(&e) => Err(MetadataError::AlreadyExists(format!(
                    "profile '{}' already exists in domain {}",
                    profile.name, profile.domain_id
                ))),
                Err(e) => Err(e.into()),
            }
        }

        async fn get_profile(
            &self,
            domain_id: i64,
            id: i64,
        ) -> MetadataResult<Option<BackendProfile>> {
            let row = sqlx::query_as::<_, ProfileRow>(
                "SELECT * FROM backend_profiles WHERE domain_id = ? AND id = ?",
            )
            .bind(domain_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            row.map(ProfileRow::into_profile).transpose()
        }

        async fn get_profile_by_id(&self, id: i64) -> MetadataResult<Option<BackendProfile>> {
            let row =
                sqlx::query_as::<_, ProfileRow>("SELECT * FROM backend_profiles WHERE id = ?")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?;
            row.map(ProfileRow::into_profile).transpose()
        }

        async fn update_profile(&self, profile: &BackendProfile) -> MetadataResult<()> {
            let result = sqlx::query(
                r#"
                UPDATE backend_profiles
                SET name = ?, description = ?, priority = ?, disabled = ?, max_size_mb = ?,
                    expire_day = ?, properties = ?, updated_at = ?, updated_by = ?
                WHERE domain_id = ? AND id = ?
                "#,
            )
            .bind(&profile.name)
            .bind(&profile.description)
            .bind(profile.priority)
            .bind(profile.disabled)
            .bind(profile.max_size_mb)
            .bind(profile.expire_day)
            .bind(profile.properties.to_json())
            .bind(profile.updated_at)
            .bind(profile.updated_by)
            .bind(profile.domain_id)
            .bind(profile.id)
            .execute(&self.pool)
            .await;

            match result {
                Ok(r) if r.rows_affected() == 0 => Err(MetadataError::NotFound(format!(
                    "profile {} in domain {}",
                    profile.id, profile.domain_id
                ))),
                Ok(_) => Ok(()),
                Err(e) if is_unique_violation(&e) => Err(MetadataError::AlreadyExists(format!(
                    "profile '{}' already exists in domain {}",
                    profile.name, profile.domain_id
                ))),
                Err(e) => Err(e.into()),
            }
        }

        async fn delete_profile(&self, domain_id: i64, id: i64) -> MetadataResult<()> {
            let mut tx = self.pool.begin().await?;

            let in_use: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM files WHERE profile_id = ?)")
                    .bind(id)
                    .fetch_one(&mut *tx)
                    .await?;
            if in_use {
                return Err(MetadataError::Constraint(format!(
                    "profile {id} is still referenced by files"
                )));
            }

            let result = sqlx::query("DELETE FROM backend_profiles WHERE domain_id = ? AND id = ?")
                .bind(domain_id)
                .bind(id)
                .execute(&mut *tx)
                .await;
            let result = match result {
                Ok(r) => r,
                Err(e) if is_foreign_key_violation(&e) => {
                    return Err(MetadataError::Constraint(format!(
                        "profile {id} is still referenced by files"
                    )));
                }
                Err(e) => return Err(e.into()),
            };
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!(
                    "profile {id} in domain {domain_id}"
                )));
            }

            tx.commit().await?;
            Ok(())
        }

        async fn list_profiles(
            &self,
            domain_id: i64,
            search: &SearchParams,
        ) -> MetadataResult<Page<BackendProfile>> {
            let rows = sqlx::query_as::<_, ProfileRow>(
                r#"
                SELECT * FROM backend_profiles
                WHERE domain_id = ? AND (? IS NULL OR name LIKE ?)
                ORDER BY priority, id
                LIMIT ? OFFSET ?
                "#,
            )
            .bind(domain_id)
            .bind(search.like_pattern())
            .bind(search.like_pattern())
            .bind(search.fetch_limit())
            .bind(search.offset())
            .fetch_all(&self.pool)
            .await?;
            Ok(search.into_page(into_profiles(rows)?))
        }

        async fn list_profiles_by_groups(
            &self,
            domain_id: i64,
            groups: &[i64],
            search: &SearchParams,
        ) -> MetadataResult<Page<BackendProfile>> {
            if groups.is_empty() {
                return Ok(search.into_page(Vec::new()));
            }

            let query = format!(
                r#"
                SELECT * FROM backend_profiles p
                WHERE p.domain_id = ? AND (? IS NULL OR p.name LIKE ?)
                  AND EXISTS (
                      SELECT 1 FROM profile_grants g
                      WHERE g.profile_id = p.id AND (g.access & ?) = ? AND g.subject IN ({})
                  )
                ORDER BY p.priority, p.id
                LIMIT ? OFFSET ?
                "#,
                placeholders(groups.len())
            );

            let mut q = sqlx::query_as::<_, ProfileRow>(&query)
                .bind(domain_id)
                .bind(search.like_pattern())
                .bind(search.like_pattern())
                .bind(access::READ)
                .bind(access::READ);
            for group in groups {
                q = q.bind(group);
            }
            let rows = q
                .bind(search.fetch_limit())
                .bind(search.offset())
                .fetch_all(&self.pool)
                .await?;
            Ok(search.into_page(into_profiles(rows)?))
        }

        async fn grant_profile_access(
            &self,
            domain_id: i64,
            profile_id: i64,
            subject: i64,
            access: i32,
        ) -> MetadataResult<()> {
            if self.get_profile(domain_id, profile_id).await?.is_none() {
                return Err(MetadataError::NotFound(format!(
                    "profile {profile_id} in domain {domain_id}"
                )));
            }
            sqlx::query(
                r#"
                INSERT INTO profile_grants (profile_id, subject, access) VALUES (?, ?, ?)
                ON CONFLICT(profile_id, subject) DO UPDATE SET access = excluded.access
                "#,
            )
            .bind(profile_id)
            .bind(subject)
            .bind(access)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn check_profile_access(
            &self,
            domain_id: i64,
            profile_id: i64,
            groups: &[i64],
            access: i32,
        ) -> MetadataResult<bool> {
            if groups.is_empty() {
                return Ok(false);
            }
            let query = format!(
                r#"
                SELECT EXISTS (
                    SELECT 1 FROM profile_grants g
                    JOIN backend_profiles p ON p.id = g.profile_id
                    WHERE p.domain_id = ? AND p.id = ? AND (g.access & ?) = ?
                      AND g.subject IN ({})
                )
                "#,
                placeholders(groups.len())
            );
            let mut q = sqlx::query_scalar::<_, bool>(&query)
                .bind(domain_id)
                .bind(profile_id)
                .bind(access)
                .bind(access);
            for group in groups {
                q = q.bind(group);
            }
            Ok(q.fetch_one(&self.pool).await?)
        }
    }

    #[async_trait]
    impl FileRepo for SqliteStore {
        async fn create_file(&self, file: &FileRow) -> MetadataResult<i64> {
            let id = sqlx::query_scalar::<_, i64>(
                r#"
                INSERT INTO files (
                    domain_id, uuid, name, view_name, size, mime_type, properties,
                    profile_id, instance, removed, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                RETURNING id
                "#,
            )
            .bind(file.domain_id)
            .bind(&file.uuid)
            .bind(&file.name)
            .bind(&file.view_name)
            .bind(file.size)
            .bind(&file.mime_type)
            .bind(&file.properties)
            .bind(file.profile_id)
            .bind(&file.instance)
            .bind(file.removed)
            .bind(file.created_at)
            .bind(file.updated_at)
            .fetch_one(&self.pool)
            .await?;
            Ok(id)
        }

        async fn get_file(&self, id: i64) -> MetadataResult<Option<FileRow>> {
            let row = sqlx::query_as::<_, FileRow>("SELECT * FROM files WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn mark_removed(
            &self,
            domain_id: i64,
            ids: &[i64],
            updated_at: OffsetDateTime,
        ) -> MetadataResult<u64> {
            const BATCH_SIZE: usize = 900;
            let mut count = 0u64;
            let mut tx = self.pool.begin().await?;
            for batch in ids.chunks(BATCH_SIZE) {
                let query = format!(
                    "UPDATE files SET removed = 1, updated_at = ? WHERE domain_id = ? AND removed = 0 AND id IN ({})",
                    placeholders(batch.len())
                );
                let mut q = sqlx::query(&query).bind(updated_at).bind(domain_id);
                for id in batch {
                    q = q.bind(id);
                }
                count += q.execute(&mut *tx).await?.rows_affected();
            }
            tx.commit().await?;
            Ok(count)
        }

        async fn get_file_with_profile(
            &self,
            domain_id: i64,
            id: i64,
        ) -> MetadataResult<Option<FileWithProfileRow>> {
            let query = format!(
                "{FILE_WITH_PROFILE_SELECT} WHERE f.domain_id = ? AND f.id = ? AND f.removed = 0"
            );
            let row = sqlx::query_as::<_, FileWithProfileRow>(&query)
                .bind(domain_id)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn get_file_by_uuid_with_profile(
            &self,
            domain_id: i64,
            uuid: &str,
        ) -> MetadataResult<Option<FileWithProfileRow>> {
            let query = format!(
                "{FILE_WITH_PROFILE_SELECT} WHERE f.domain_id = ? AND f.uuid = ? AND f.removed = 0 ORDER BY f.id DESC LIMIT 1"
            );
            let row = sqlx::query_as::<_, FileWithProfileRow>(&query)
                .bind(domain_id)
                .bind(uuid)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn list_files(
            &self,
            domain_id: i64,
            search: &SearchParams,
        ) -> MetadataResult<Page<FileRow>> {
            let rows = sqlx::query_as::<_, FileRow>(
                r#"
                SELECT * FROM files
                WHERE domain_id = ? AND removed = 0 AND (? IS NULL OR view_name LIKE ?)
                ORDER BY id DESC
                LIMIT ? OFFSET ?
                "#,
            )
            .bind(domain_id)
            .bind(search.like_pattern())
            .bind(search.like_pattern())
            .bind(search.fetch_limit())
            .bind(search.offset())
            .fetch_all(&self.pool)
            .await?;
            Ok(search.into_page(rows))
        }
    }

    #[async_trait]
    impl SyncJobRepo for SqliteStore {
        async fn fetch_jobs(
            &self,
            limit: u32,
            now: OffsetDateTime,
        ) -> MetadataResult<Vec<ClaimedJobRow>> {
            let mut tx = self.pool.begin().await?;

            let ids: Vec<i64> = sqlx::query_scalar(
                r#"
                UPDATE sync_jobs SET state = 'processing', updated_at = ?
                WHERE id IN (
                    SELECT id FROM sync_jobs
                    WHERE state = 'pending'
                    ORDER BY julianday(created_at), id
                    LIMIT ?
                )
                RETURNING id
                "#,
            )
            .bind(now)
            .bind(i64::from(limit))
            .fetch_all(&mut *tx)
            .await?;

            if ids.is_empty() {
                tx.commit().await?;
                return Ok(Vec::new());
            }

            let query = format!(
                "{CLAIMED_JOB_SELECT} WHERE j.id IN ({}) ORDER BY julianday(j.created_at), j.id",
                placeholders(ids.len())
            );
            let mut q = sqlx::query_as::<_, ClaimedJobRow>(&query);
            for id in &ids {
                q = q.bind(id);
            }
            let jobs = q.fetch_all(&mut *tx).await?;

            tx.commit().await?;
            Ok(jobs)
        }

        async fn set_remove_jobs(
            &self,
            now: OffsetDateTime,
            default_expire_day: u32,
        ) -> MetadataResult<u64> {
            let action = JobAction::Remove.as_str();
            let mut created = 0u64;
            let mut tx = self.pool.begin().await?;

            let expiring: Vec<(i64, i32)> = sqlx::query_as(
                "SELECT id, expire_day FROM backend_profiles WHERE expire_day > 0 AND disabled = 0",
            )
            .fetch_all(&mut *tx)
            .await?;

            for (profile_id, expire_day) in expiring {
                let Some(cutoff) = expiry_cutoff(now, i64::from(expire_day)) else {
                    tracing::warn!(profile_id, expire_day, "expiry out of range, profile skipped");
                    continue;
                };
                created += sqlx::query(
                    r#"
                    INSERT OR IGNORE INTO sync_jobs (file_id, action, state, created_at, updated_at)
                    SELECT f.id, ?, 'pending', ?, ?
                    FROM files f
                    WHERE f.profile_id = ? AND julianday(f.created_at) < julianday(?)
                      AND NOT EXISTS (SELECT 1 FROM sync_jobs j WHERE j.file_id = f.id)
                    ORDER BY julianday(f.created_at)
                    LIMIT ?
                    "#,
                )
                .bind(action)
                .bind(now)
                .bind(now)
                .bind(profile_id)
                .bind(cutoff)
                .bind(ENQUEUE_BATCH_LIMIT)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            }

            if let Some(cutoff) = expiry_cutoff(now, i64::from(default_expire_day)) {
                created += sqlx::query(
                    r#"
                    INSERT OR IGNORE INTO sync_jobs (file_id, action, state, created_at, updated_at)
                    SELECT f.id, ?, 'pending', ?, ?
                    FROM files f
                    WHERE f.profile_id IS NULL AND julianday(f.created_at) < julianday(?)
                      AND NOT EXISTS (SELECT 1 FROM sync_jobs j WHERE j.file_id = f.id)
                    ORDER BY julianday(f.created_at)
                    LIMIT ?
                    "#,
                )
                .bind(action)
                .bind(now)
                .bind(now)
                .bind(cutoff)
                .bind(ENQUEUE_BATCH_LIMIT)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            }

            created += sqlx::query(
                r#"
                INSERT OR IGNORE INTO sync_jobs (file_id, action, state, created_at, updated_at)
                SELECT f.id, ?, 'pending', ?, ?
                FROM files f
                WHERE f.removed = 1
                  AND NOT EXISTS (SELECT 1 FROM sync_jobs j WHERE j.file_id = f.id)
                ORDER BY julianday(f.created_at)
                LIMIT ?
                "#,
            )
            .bind(action)
            .bind(now)
            .bind(now)
            .bind(ENQUEUE_BATCH_LIMIT)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            tx.commit().await?;
            Ok(created)
        }

        async fn clean(&self, job_id: i64) -> MetadataResult<()> {
            let mut tx = self.pool.begin().await?;
            let file_id: Option<i64> =
                sqlx::query_scalar("DELETE FROM sync_jobs WHERE id = ? RETURNING file_id")
                    .bind(job_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            if let Some(file_id) = file_id {
                sqlx::query("DELETE FROM files WHERE id = ?")
                    .bind(file_id)
                    .execute(&mut *tx)
                    .await?;
            }
            tx.commit().await?;
            Ok(())
        }

        async fn remove_job(&self, job_id: i64) -> MetadataResult<()> {
            sqlx::query("DELETE FROM sync_jobs WHERE id = ?")
                .bind(job_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        }

        async fn set_error(
            &self,
            job_id: i64,
            message: &str,
            now: OffsetDateTime,
        ) -> MetadataResult<()> {
            sqlx::query("UPDATE sync_jobs SET state = 'error', error = ?, updated_at = ? WHERE id = ?")
                .bind(message)
                .bind(now)
                .bind(job_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        }

        async fn remove_errors(&self, older_than: OffsetDateTime) -> MetadataResult<u64> {
            let result = sqlx::query(
                "DELETE FROM sync_jobs WHERE state = 'error' AND julianday(updated_at) < julianday(?)",
            )
            .bind(older_than)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected())
        }

        async fn get_job(&self, job_id: i64) -> MetadataResult<Option<SyncJobRow>> {
            let row = sqlx::query_as::<_, SyncJobRow>("SELECT * FROM sync_jobs WHERE id = ?")
                .bind(job_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn get_job_for_file(&self, file_id: i64) -> MetadataResult<Option<SyncJobRow>> {
            let row =
                sqlx::query_as::<_, SyncJobRow>("SELECT * FROM sync_jobs WHERE file_id = ?")
                    .bind(file_id)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row)
        }
    }

    #[async_trait]
    impl UploadJobRepo for SqliteStore {
        async fn create_upload_job(&self, job: &UploadJobRow) -> MetadataResult<i64> {
            let id = sqlx::query_scalar::<_, i64>(
                r#"
                INSERT INTO upload_jobs (
                    domain_id, uuid, name, view_name, mime_type, size, properties,
                    profile_id, instance, state, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?, ?)
                RETURNING id
                "#,
            )
            .bind(job.domain_id)
            .bind(&job.uuid)
            .bind(&job.name)
            .bind(&job.view_name)
            .bind(&job.mime_type)
            .bind(job.size)
            .bind(&job.properties)
            .bind(job.profile_id)
            .bind(&job.instance)
            .bind(job.created_at)
            .bind(job.updated_at)
            .fetch_one(&self.pool)
            .await?;
            Ok(id)
        }

        async fn get_upload_job(&self, id: i64) -> MetadataResult<Option<UploadJobRow>> {
            let row = sqlx::query_as::<_, UploadJobRow>("SELECT * FROM upload_jobs WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn fetch_upload_jobs(
            &self,
            limit: u32,
            now: OffsetDateTime,
        ) -> MetadataResult<Vec<UploadJobRow>> {
            let mut tx = self.pool.begin().await?;
            let mut jobs = sqlx::query_as::<_, UploadJobRow>(
                r#"
                UPDATE upload_jobs SET state = 'processing', updated_at = ?
                WHERE id IN (
                    SELECT id FROM upload_jobs
                    WHERE state = 'pending'
                    ORDER BY julianday(created_at), id
                    LIMIT ?
                )
                RETURNING *
                "#,
            )
            .bind(now)
            .bind(i64::from(limit))
            .fetch_all(&mut *tx)
            .await?;
            tx.commit().await?;

            jobs.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
            Ok(jobs)
        }

        async fn complete_upload_job(&self, job_id: i64, file: &FileRow) -> MetadataResult<i64> {
            let mut tx = self.pool.begin().await?;

            let deleted = sqlx::query("DELETE FROM upload_jobs WHERE id = ?")
                .bind(job_id)
                .execute(&mut *tx)
                .await?;
            if deleted.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("upload job {job_id}")));
            }

            let id = sqlx::query_scalar::<_, i64>(
                r#"
                INSERT INTO files (
                    domain_id, uuid, name, view_name, size, mime_type, properties,
                    profile_id, instance, removed, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
                RETURNING id
                "#,
            )
            .bind(file.domain_id)
            .bind(&file.uuid)
            .bind(&file.name)
            .bind(&file.view_name)
            .bind(file.size)
            .bind(&file.mime_type)
            .bind(&file.properties)
            .bind(file.profile_id)
            .bind(&file.instance)
            .bind(file.created_at)
            .bind(file.updated_at)
            .fetch_one(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(id)
        }

        async fn set_upload_job_error(
            &self,
            job_id: i64,
            message: &str,
            now: OffsetDateTime,
        ) -> MetadataResult<()> {
            sqlx::query(
                "UPDATE upload_jobs SET state = 'error', error = ?, updated_at = ? WHERE id = ?",
            )
            .bind(message)
            .bind(now)
            .bind(job_id)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn remove_upload_errors(
            &self,
            older_than: OffsetDateTime,
        ) -> MetadataResult<Vec<UploadJobRow>> {
            let rows = sqlx::query_as::<_, UploadJobRow>(
                "DELETE FROM upload_jobs WHERE state = 'error' AND julianday(updated_at) < julianday(?) RETURNING *",
            )
            .bind(older_than)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }
    }
}

/// SQL schema for SQLite.
const SCHEMA_SQL: &str = r#"
-- Backend profiles
CREATE TABLE IF NOT EXISTS backend_profiles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    domain_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    description TEXT,
    priority INTEGER NOT NULL DEFAULT 0,
    disabled INTEGER NOT NULL DEFAULT 0,
    max_size_mb INTEGER NOT NULL DEFAULT 0,
    expire_day INTEGER NOT NULL DEFAULT 0,
    backend_type TEXT NOT NULL,
    properties TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    created_by INTEGER,
    updated_at TEXT NOT NULL,
    updated_by INTEGER,
    UNIQUE(domain_id, name)
);
CREATE INDEX IF NOT EXISTS idx_backend_profiles_domain ON backend_profiles(domain_id, priority, id);
CREATE INDEX IF NOT EXISTS idx_backend_profiles_expiry ON backend_profiles(expire_day) WHERE expire_day > 0;

-- Access grants on profiles (bitmask: 1 read, 2 write, 4 delete)
CREATE TABLE IF NOT EXISTS profile_grants (
    profile_id INTEGER NOT NULL REFERENCES backend_profiles(id) ON DELETE CASCADE,
    subject INTEGER NOT NULL,
    access INTEGER NOT NULL,
    PRIMARY KEY (profile_id, subject)
);
CREATE INDEX IF NOT EXISTS idx_profile_grants_subject ON profile_grants(subject);

-- Files
CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    domain_id INTEGER NOT NULL,
    uuid TEXT NOT NULL,
    name TEXT NOT NULL,
    view_name TEXT NOT NULL,
    size INTEGER NOT NULL,
    mime_type TEXT NOT NULL,
    properties TEXT NOT NULL DEFAULT '{}',
    profile_id INTEGER REFERENCES backend_profiles(id),
    instance TEXT NOT NULL,
    removed INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_files_domain ON files(domain_id, id);
CREATE INDEX IF NOT EXISTS idx_files_uuid ON files(domain_id, uuid);
CREATE INDEX IF NOT EXISTS idx_files_profile ON files(profile_id, created_at);
CREATE INDEX IF NOT EXISTS idx_files_removed ON files(removed) WHERE removed = 1;

-- Sync jobs: at most one per file
CREATE TABLE IF NOT EXISTS sync_jobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    action TEXT NOT NULL,
    config TEXT,
    state TEXT NOT NULL DEFAULT 'pending',
    error TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_sync_jobs_file ON sync_jobs(file_id);
CREATE INDEX IF NOT EXISTS idx_sync_jobs_state ON sync_jobs(state, created_at);

-- Staged uploads
CREATE TABLE IF NOT EXISTS upload_jobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    domain_id INTEGER NOT NULL,
    uuid TEXT NOT NULL,
    name TEXT NOT NULL,
    view_name TEXT NOT NULL,
    mime_type TEXT NOT NULL,
    size INTEGER NOT NULL,
    properties TEXT NOT NULL DEFAULT '{}',
    profile_id INTEGER,
    instance TEXT NOT NULL,
    state TEXT NOT NULL DEFAULT 'pending',
    error TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_upload_jobs_state ON upload_jobs(state, created_at);
"#;
