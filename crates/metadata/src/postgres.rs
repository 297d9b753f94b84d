//! PostgreSQL-based metadata store implementation.
//!
//! Job claiming and enqueueing rely on row locks with `SKIP LOCKED`, so any
//! number of processes can share one queue.

use crate::error::{MetadataError, MetadataResult, is_foreign_key_violation, is_unique_violation};
use crate::models::*;
use crate::repos::{
    ENQUEUE_BATCH_LIMIT, FileRepo, JobAction, ProfileRepo, SyncJobRepo, UploadJobRepo,
    expiry_cutoff,
};
use crate::store::MetadataStore;
use async_trait::async_trait;
use depot_core::{BackendProfile, MAX_EXPIRE_DAY};
use depot_core::config::PgSslMode;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode as SqlxPgSslMode};
use sqlx::{Pool, Postgres};
use std::str::FromStr;
use time::OffsetDateTime;

/// PostgreSQL schema (embedded).
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

fn postgres_schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                return None;
            }
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

/// PostgreSQL-based metadata store.
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Create a new PostgreSQL store from a connection URL.
    pub async fn from_url(
        url: &str,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let opts = PgConnectOptions::from_str(url)?;
        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    /// Create a new PostgreSQL store from individual connection parameters,
    /// so the password can arrive through its own environment variable.
    #[allow(clippy::too_many_arguments)]
    pub async fn from_params(
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        database: &str,
        ssl_mode: Option<PgSslMode>,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let mut opts = PgConnectOptions::new()
            .host(host)
            .port(port)
            .database(database);

        if let Some(user) = username {
            opts = opts.username(user);
        }

        if let Some(pass) = password {
            opts = opts.password(pass);
        }

        if let Some(mode) = ssl_mode {
            let sqlx_mode = match mode {
                PgSslMode::Disable => SqlxPgSslMode::Disable,
                PgSslMode::Prefer => SqlxPgSslMode::Prefer,
                PgSslMode::Require => SqlxPgSslMode::Require,
            };
            opts = opts.ssl_mode(sqlx_mode);
        }

        tracing::info!(
            host = host,
            port = port,
            database = database,
            username = username.unwrap_or("<none>"),
            ssl_mode = ?ssl_mode,
            "Connecting to PostgreSQL with individual parameters"
        );

        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    async fn connect(
        mut opts: PgConnectOptions,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        if let Some(timeout_ms) = statement_timeout_ms {
            opts = opts.options([("statement_timeout", format!("{}ms", timeout_ms))]);
            tracing::info!("PostgreSQL statement_timeout set to {}ms", timeout_ms);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for PostgresStore {
    async fn migrate(&self) -> MetadataResult<()> {
        // Prepared statements hold one statement each.
        for statement in postgres_schema_statements(POSTGRES_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

const FILE_WITH_PROFILE_SELECT: &str = r#"
    SELECT f.*, p.updated_at AS profile_updated_at
    FROM files f
    LEFT JOIN backend_profiles p ON p.id = f.profile_id
"#;

fn profile_exists_error(profile: &BackendProfile) -> MetadataError {
    MetadataError::AlreadyExists(format!(
        "profile '{}' already exists in domain {}",
        profile.name, profile.domain_id
    ))
}

#[async_trait]
impl ProfileRepo for PostgresStore {
    async fn create_profile(&self, profile: &BackendProfile) -> MetadataResult<i64> {
        let result = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO backend_profiles (
                domain_id, name, description, priority, disabled, max_size_mb, expire_day,
                backend_type, properties, created_at, created_by, updated_at, updated_by
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
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
            Err(e) if is_unique_violation(&e) => Err(profile_exists_error(profile)),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_profile(&self, domain_id: i64, id: i64) -> MetadataResult<Option<BackendProfile>> {
        let row = sqlx::query_as::<_, ProfileRow>(
            "SELECT * FROM backend_profiles WHERE domain_id = $1 AND id = $2",
        )
        .bind(domain_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ProfileRow::into_profile).transpose()
    }

    async fn get_profile_by_id(&self, id: i64) -> MetadataResult<Option<BackendProfile>> {
        let row = sqlx::query_as::<_, ProfileRow>("SELECT * FROM backend_profiles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(ProfileRow::into_profile).transpose()
    }

    async fn update_profile(&self, profile: &BackendProfile) -> MetadataResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE backend_profiles
            SET name = $1, description = $2, priority = $3, disabled = $4, max_size_mb = $5,
                expire_day = $6, properties = $7, updated_at = $8, updated_by = $9
            WHERE domain_id = $10 AND id = $11
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
            Err(e) if is_unique_violation(&e) => Err(profile_exists_error(profile)),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_profile(&self, domain_id: i64, id: i64) -> MetadataResult<()> {
        let mut tx = self.pool.begin().await?;

        // Lock the profile so no file can start referencing it mid-check.
        let locked: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM backend_profiles WHERE domain_id = $1 AND id = $2 FOR UPDATE",
        )
        .bind(domain_id)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        if locked.is_none() {
            return Err(MetadataError::NotFound(format!(
                "profile {id} in domain {domain_id}"
            )));
        }

        let in_use: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM files WHERE profile_id = $1)")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
        if in_use {
            return Err(MetadataError::Constraint(format!(
                "profile {id} is still referenced by files"
            )));
        }

        match sqlx::query("DELETE FROM backend_profiles WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
        {
            Ok(_) => {}
            Err(e) if is_foreign_key_violation(&e) => {
                return Err(MetadataError::Constraint(format!(
                    "profile {id} is still referenced by files"
                )));
            }
            Err(e) => return Err(e.into()),
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
            WHERE domain_id = $1 AND ($2::text IS NULL OR name LIKE $2)
            ORDER BY priority, id
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(domain_id)
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
        let rows = sqlx::query_as::<_, ProfileRow>(
            r#"
            SELECT * FROM backend_profiles p
            WHERE p.domain_id = $1 AND ($2::text IS NULL OR p.name LIKE $2)
              AND EXISTS (
                  SELECT 1 FROM profile_grants g
                  WHERE g.profile_id = p.id AND (g.access & $3) = $3 AND g.subject = ANY($4)
              )
            ORDER BY p.priority, p.id
            LIMIT $5 OFFSET $6
            "#,
        )
        .bind(domain_id)
        .bind(search.like_pattern())
        .bind(access::READ)
        .bind(groups)
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
        let result = sqlx::query(
            r#"
            INSERT INTO profile_grants (profile_id, subject, access)
            SELECT p.id, $3, $4 FROM backend_profiles p WHERE p.domain_id = $1 AND p.id = $2
            ON CONFLICT (profile_id, subject) DO UPDATE SET access = EXCLUDED.access
            "#,
        )
        .bind(domain_id)
        .bind(profile_id)
        .bind(subject)
        .bind(access)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(MetadataError::NotFound(format!(
                "profile {profile_id} in domain {domain_id}"
            )));
        }
        Ok(())
    }

    async fn check_profile_access(
        &self,
        domain_id: i64,
        profile_id: i64,
        groups: &[i64],
        access: i32,
    ) -> MetadataResult<bool> {
        let allowed: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM profile_grants g
                JOIN backend_profiles p ON p.id = g.profile_id
                WHERE p.domain_id = $1 AND p.id = $2 AND (g.access & $3) = $3
                  AND g.subject = ANY($4)
            )
            "#,
        )
        .bind(domain_id)
        .bind(profile_id)
        .bind(access)
        .bind(groups)
        .fetch_one(&self.pool)
        .await?;
        Ok(allowed)
    }
}

#[async_trait]
impl FileRepo for PostgresStore {
    async fn create_file(&self, file: &FileRow) -> MetadataResult<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO files (
                domain_id, uuid, name, view_name, size, mime_type, properties,
                profile_id, instance, removed, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
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
        let row = sqlx::query_as::<_, FileRow>("SELECT * FROM files WHERE id = $1")
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
        let result = sqlx::query(
            "UPDATE files SET removed = TRUE, updated_at = $1 WHERE domain_id = $2 AND NOT removed AND id = ANY($3)",
        )
        .bind(updated_at)
        .bind(domain_id)
        .bind(ids)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn get_file_with_profile(
        &self,
        domain_id: i64,
        id: i64,
    ) -> MetadataResult<Option<FileWithProfileRow>> {
        let query = format!(
            "{FILE_WITH_PROFILE_SELECT} WHERE f.domain_id = $1 AND f.id = $2 AND NOT f.removed"
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
            "{FILE_WITH_PROFILE_SELECT} WHERE f.domain_id = $1 AND f.uuid = $2 AND NOT f.removed ORDER BY f.id DESC LIMIT 1"
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
            WHERE domain_id = $1 AND NOT removed AND ($2::text IS NULL OR view_name LIKE $2)
            ORDER BY id DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(domain_id)
        .bind(search.like_pattern())
        .bind(search.fetch_limit())
        .bind(search.offset())
        .fetch_all(&self.pool)
        .await?;
        Ok(search.into_page(rows))
    }
}

#[async_trait]
impl SyncJobRepo for PostgresStore {
    async fn fetch_jobs(&self, limit: u32, now: OffsetDateTime) -> MetadataResult<Vec<ClaimedJobRow>> {
        // Rows locked by another claimer are skipped, never waited on.
        let jobs = sqlx::query_as::<_, ClaimedJobRow>(
            r#"
            WITH claimed AS (
                SELECT j.id, f.domain_id, f.name, f.size, f.mime_type, f.properties, f.instance,
                       f.profile_id, p.updated_at AS profile_updated_at
                FROM sync_jobs j
                JOIN files f ON f.id = j.file_id
                LEFT JOIN backend_profiles p ON p.id = f.profile_id
                WHERE j.state = 'pending'
                ORDER BY j.created_at, j.id
                LIMIT $1
                FOR UPDATE OF j SKIP LOCKED
            ), updated AS (
                UPDATE sync_jobs u
                SET state = 'processing', updated_at = $2
                FROM claimed c
                WHERE u.id = c.id AND u.state = 'pending'
                RETURNING u.id, u.file_id, u.action, u.config, u.created_at,
                          c.domain_id, c.name, c.size, c.mime_type, c.properties, c.instance,
                          c.profile_id, c.profile_updated_at
            )
            SELECT * FROM updated ORDER BY created_at, id
            "#,
        )
        .bind(i64::from(limit))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }

    async fn set_remove_jobs(
        &self,
        now: OffsetDateTime,
        default_expire_day: u32,
    ) -> MetadataResult<u64> {
        // Out-of-range values disable the source instead of failing the statement.
        let default_expire_day = match expiry_cutoff(now, i64::from(default_expire_day)) {
            Some(_) => i32::try_from(default_expire_day).unwrap_or(0),
            None => 0,
        };
        let result = sqlx::query(
            r#"
            WITH profile_expired AS (
                SELECT f.id
                FROM backend_profiles p
                CROSS JOIN LATERAL (
                    SELECT f.id FROM files f
                    WHERE f.profile_id = p.id
                      AND f.created_at < $1 - make_interval(days => LEAST(p.expire_day, $5))
                      AND NOT EXISTS (SELECT 1 FROM sync_jobs j WHERE j.file_id = f.id)
                    ORDER BY f.created_at
                    LIMIT $3
                    FOR UPDATE SKIP LOCKED
                ) f
                WHERE p.expire_day > 0 AND p.expire_day <= $5 AND NOT p.disabled
            ), default_expired AS (
                SELECT f.id FROM files f
                WHERE $2 > 0 AND f.profile_id IS NULL
                  AND f.created_at < $1 - make_interval(days => $2)
                  AND NOT EXISTS (SELECT 1 FROM sync_jobs j WHERE j.file_id = f.id)
                ORDER BY f.created_at
                LIMIT $3
                FOR UPDATE SKIP LOCKED
            ), soft_deleted AS (
                SELECT f.id FROM files f
                WHERE f.removed
                  AND NOT EXISTS (SELECT 1 FROM sync_jobs j WHERE j.file_id = f.id)
                ORDER BY f.created_at
                LIMIT $3
                FOR UPDATE SKIP LOCKED
            )
            INSERT INTO sync_jobs (file_id, action, state, created_at, updated_at)
            SELECT t.id, $4, 'pending', $1, $1
            FROM (
                SELECT id FROM profile_expired
                UNION SELECT id FROM default_expired
                UNION SELECT id FROM soft_deleted
            ) t
            ON CONFLICT (file_id) DO NOTHING
            "#,
        )
        .bind(now)
        .bind(default_expire_day)
        .bind(ENQUEUE_BATCH_LIMIT)
        .bind(JobAction::Remove.as_str())
        .bind(MAX_EXPIRE_DAY)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn clean(&self, job_id: i64) -> MetadataResult<()> {
        let mut tx = self.pool.begin().await?;
        let file_id: Option<i64> =
            sqlx::query_scalar("DELETE FROM sync_jobs WHERE id = $1 RETURNING file_id")
                .bind(job_id)
                .fetch_optional(&mut *tx)
                .await?;
        if let Some(file_id) = file_id {
            sqlx::query("DELETE FROM files WHERE id = $1")
                .bind(file_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn remove_job(&self, job_id: i64) -> MetadataResult<()> {
        sqlx::query("DELETE FROM sync_jobs WHERE id = $1")
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_error(&self, job_id: i64, message: &str, now: OffsetDateTime) -> MetadataResult<()> {
        sqlx::query("UPDATE sync_jobs SET state = 'error', error = $1, updated_at = $2 WHERE id = $3")
            .bind(message)
            .bind(now)
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn remove_errors(&self, older_than: OffsetDateTime) -> MetadataResult<u64> {
        let result = sqlx::query("DELETE FROM sync_jobs WHERE state = 'error' AND updated_at < $1")
            .bind(older_than)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn get_job(&self, job_id: i64) -> MetadataResult<Option<SyncJobRow>> {
        let row = sqlx::query_as::<_, SyncJobRow>("SELECT * FROM sync_jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn get_job_for_file(&self, file_id: i64) -> MetadataResult<Option<SyncJobRow>> {
        let row = sqlx::query_as::<_, SyncJobRow>("SELECT * FROM sync_jobs WHERE file_id = $1")
            .bind(file_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }
}

#[async_trait]
impl UploadJobRepo for PostgresStore {
    async fn create_upload_job(&self, job: &UploadJobRow) -> MetadataResult<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO upload_jobs (
                domain_id, uuid, name, view_name, mime_type, size, properties,
                profile_id, instance, state, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'pending', $10, $11)
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
        let row = sqlx::query_as::<_, UploadJobRow>("SELECT * FROM upload_jobs WHERE id = $1")
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
        let jobs = sqlx::query_as::<_, UploadJobRow>(
            r#"
            WITH claimed AS (
                SELECT id FROM upload_jobs
                WHERE state = 'pending'
                ORDER BY created_at, id
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            ), updated AS (
                UPDATE upload_jobs u
                SET state = 'processing', updated_at = $2
                FROM claimed c
                WHERE u.id = c.id AND u.state = 'pending'
                RETURNING u.*
            )
            SELECT * FROM updated ORDER BY created_at, id
            "#,
        )
        .bind(i64::from(limit))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }

    async fn complete_upload_job(&self, job_id: i64, file: &FileRow) -> MetadataResult<i64> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM upload_jobs WHERE id = $1")
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
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, FALSE, $10, $11)
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
        sqlx::query("UPDATE upload_jobs SET state = 'error', error = $1, updated_at = $2 WHERE id = $3")
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
            "DELETE FROM upload_jobs WHERE state = 'error' AND updated_at < $1 RETURNING *",
        )
        .bind(older_than)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
