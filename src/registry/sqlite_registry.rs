//! SQLite-backed Job Registry.
//!
//! A single file-backed relational store (spec.md §6), accessed through
//! `sqlx`. `claim_or_find` is the one operation that must run under a lock
//! held across its read-then-insert (spec.md §4.3) — everything else is a
//! plain CAS `UPDATE ... WHERE status = ?`.

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use super::error::RegistryError;
use super::job::{Format, Job, JobStatus, Query};
use super::{JobRegistry, TransitionPatch};

pub struct SqliteRegistry {
    pool: SqlitePool,
    claim_lock: Mutex<()>,
}

impl SqliteRegistry {
    /// Open (creating if absent) the registry file at `path` and run migrations.
    pub async fn open(path: &str) -> Result<Self, RegistryError> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{path}"))
            .map_err(sqlx::Error::from)?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self {
            pool,
            claim_lock: Mutex::new(()),
        })
    }

    /// Open an in-memory registry. Useful for tests; the data does not
    /// survive process restart.
    pub async fn open_in_memory() -> Result<Self, RegistryError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self {
            pool,
            claim_lock: Mutex::new(()),
        })
    }
}

#[async_trait::async_trait]
impl JobRegistry for SqliteRegistry {
    async fn upsert_query(&self, sql: &str) -> Result<String, RegistryError> {
        let fingerprint = crate::fingerprint::fingerprint(sql);
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO queries (fingerprint, sql, created_at) VALUES (?, ?, ?)
             ON CONFLICT (fingerprint) DO NOTHING",
        )
        .bind(&fingerprint)
        .bind(sql)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(fingerprint)
    }

    async fn get_query(&self, fingerprint: &str) -> Result<Option<Query>, RegistryError> {
        let query = sqlx::query_as::<_, Query>(
            "SELECT fingerprint, sql, created_at FROM queries WHERE fingerprint = ?",
        )
        .bind(fingerprint)
        .fetch_optional(&self.pool)
        .await?;
        Ok(query)
    }

    async fn claim_or_find(
        &self,
        fingerprint: &str,
        new_job_id: Uuid,
        format: Format,
        artifact_key: &str,
    ) -> Result<(Job, bool), RegistryError> {
        let _guard = self.claim_lock.lock().await;

        if let Some(existing) = self.latest_job_for(fingerprint).await? {
            if existing.status.is_active() || existing.status == JobStatus::Ready {
                return Ok((existing, false));
            }
        }

        let job = Job::new_pending(new_job_id, fingerprint.to_string(), format, artifact_key.to_string());
        sqlx::query(
            "INSERT INTO jobs (job_id, fingerprint, status, format, created_at, artifact_key)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(job.job_id)
        .bind(&job.fingerprint)
        .bind(job.status)
        .bind(job.format)
        .bind(job.created_at)
        .bind(&job.artifact_key)
        .execute(&self.pool)
        .await?;

        Ok((job, true))
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, RegistryError> {
        let job = sqlx::query_as::<_, Job>(
            "SELECT job_id, fingerprint, status, format, created_at, completed_at,
                    row_count, artifact_bytes, artifact_key, error_code
             FROM jobs WHERE job_id = ?",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(job)
    }

    async fn latest_job_for(&self, fingerprint: &str) -> Result<Option<Job>, RegistryError> {
        let job = sqlx::query_as::<_, Job>(
            "SELECT job_id, fingerprint, status, format, created_at, completed_at,
                    row_count, artifact_bytes, artifact_key, error_code
             FROM jobs WHERE fingerprint = ?
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(fingerprint)
        .fetch_optional(&self.pool)
        .await?;
        Ok(job)
    }

    async fn transition(
        &self,
        job_id: Uuid,
        from: JobStatus,
        to: JobStatus,
        patch: TransitionPatch,
    ) -> Result<bool, RegistryError> {
        let result = sqlx::query(
            "UPDATE jobs SET status = ?, completed_at = ?, row_count = ?, artifact_bytes = ?, error_code = ?
             WHERE job_id = ? AND status = ?",
        )
        .bind(to)
        .bind(patch.completed_at)
        .bind(patch.row_count)
        .bind(patch.artifact_bytes)
        .bind(patch.error_code.map(|c| c.to_string()))
        .bind(job_id)
        .bind(from)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn reconcile_orphans(&self) -> Result<u64, RegistryError> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE jobs SET status = ?, completed_at = ?, error_code = ?
             WHERE status IN (?, ?)",
        )
        .bind(JobStatus::Error)
        .bind(now)
        .bind(crate::error::ErrorCode::RecoveredOrphan.as_str())
        .bind(JobStatus::Pending)
        .bind(JobStatus::Running)
        .execute(&self.pool)
        .await?;

        let count = result.rows_affected();
        if count > 0 {
            warn!(count, "reconciled orphaned jobs from a prior run");
        } else {
            info!("no orphaned jobs to reconcile");
        }
        Ok(count)
    }

    async fn ping(&self) -> Result<(), RegistryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
