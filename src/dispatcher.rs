//! Dispatcher — the entry point: deduplicates, enrolls jobs, hands off to
//! the Worker Pool, and exposes status/result reads (spec.md §4.5).
//!
//! The Dispatcher owns no state of its own; it reads and writes the
//! `JobRegistry` and `ArtifactStore` it was constructed with, and forwards
//! new work to the `WorkerPool`. It is the only collaborator the HTTP
//! layer talks to.

use std::sync::Arc;

use uuid::Uuid;

use crate::artifact_store::{ArtifactStore, ByteStream};
use crate::error::{DispatcherError, ErrorCode};
use crate::registry::{Format, Job, JobRegistry, JobStatus};
use crate::telemetry::Telemetry;
use crate::worker::{PoolError, WorkItem, WorkerPool};

/// A column name/type pair, as returned by `schema`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: String,
}

/// The handle returned by `submit` and `status` (spec.md §4.5, §6).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct JobHandle {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub format: Format,
}

impl From<&Job> for JobHandle {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.job_id,
            status: job.status,
            format: job.format,
        }
    }
}

/// Combined Registry + Artifact Store view for `metadata` (spec.md §4.5).
#[derive(Debug, Clone, serde::Serialize)]
pub struct JobMetadata {
    pub job_id: Uuid,
    pub columns: Option<Vec<ColumnSchema>>,
    pub num_rows: Option<i64>,
    pub num_columns: Option<usize>,
    pub cached: bool,
    pub size: Option<u64>,
    pub last_modified: Option<chrono::DateTime<chrono::Utc>>,
    pub key: String,
}

/// The bucket name artifact keys are namespaced under; purely a prefix, not
/// part of the object-store connection (spec.md §4.2, §6).
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<dyn JobRegistry>,
    artifact_store: Arc<dyn ArtifactStore>,
    worker_pool: Arc<WorkerPool>,
    telemetry: Arc<dyn Telemetry>,
    bucket: String,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<dyn JobRegistry>,
        artifact_store: Arc<dyn ArtifactStore>,
        worker_pool: Arc<WorkerPool>,
        telemetry: Arc<dyn Telemetry>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            artifact_store,
            worker_pool,
            telemetry,
            bucket: bucket.into(),
        }
    }

    /// Reconcile orphaned jobs left `pending`/`running` by a prior process
    /// (spec.md §4.3). Must run before the Dispatcher accepts submissions.
    pub async fn reconcile_orphans_on_startup(&self) -> Result<u64, DispatcherError> {
        let count = self.registry.reconcile_orphans().await?;
        for _ in 0..count {
            self.telemetry.record_error(ErrorCode::RecoveredOrphan);
        }
        Ok(count)
    }

    /// Canonicalize, fingerprint, dedup, enroll, and (if new) dispatch to
    /// the worker pool (spec.md §4.5).
    pub async fn submit(&self, sql: &str) -> Result<JobHandle, DispatcherError> {
        self.telemetry.record_submission();

        let sql = sql.trim();
        let fingerprint = self.registry.upsert_query(sql).await?;
        let format = Format::ArrowIpcStream;
        let artifact_key = crate::artifact_store::artifact_key(&self.bucket, &fingerprint, format.extension());
        let candidate_job_id = Uuid::new_v4();

        let (job, created) = self
            .registry
            .claim_or_find(&fingerprint, candidate_job_id, format, &artifact_key)
            .await?;

        if created {
            let item = WorkItem {
                job_id: job.job_id,
                sql: sql.to_string(),
                fingerprint: fingerprint.clone(),
                artifact_key: artifact_key.clone(),
            };
            if let Err(PoolError::Overloaded) = self.worker_pool.submit(item) {
                // The job row is already inserted as `pending`; nobody will
                // ever claim it. Mark it `error(overloaded)` so it does not
                // linger as a phantom active job for this fingerprint.
                let patch = crate::registry::TransitionPatch {
                    completed_at: Some(chrono::Utc::now()),
                    error_code: Some(ErrorCode::Overloaded.as_str().to_string()),
                    ..Default::default()
                };
                let _ = self
                    .registry
                    .transition(job.job_id, JobStatus::Pending, JobStatus::Error, patch)
                    .await;
                self.telemetry.record_error(ErrorCode::Overloaded);
                return Err(DispatcherError::Overloaded);
            }
        } else if job.status == JobStatus::Ready {
            self.telemetry.record_cache_hit();
        } else {
            self.telemetry.record_dedup_join();
        }

        Ok(JobHandle::from(&job))
    }

    /// Point lookup of a job's current status (spec.md §4.5).
    pub async fn status(&self, job_id: Uuid) -> Result<JobHandle, DispatcherError> {
        let job = self
            .registry
            .get_job(job_id)
            .await?
            .ok_or(DispatcherError::NotFound(job_id))?;
        Ok(JobHandle::from(&job))
    }

    /// Stream the artifact bytes for a `ready` job (spec.md §4.5).
    pub async fn result_stream(&self, job_id: Uuid) -> Result<ByteStream, DispatcherError> {
        let job = self
            .registry
            .get_job(job_id)
            .await?
            .ok_or(DispatcherError::NotFound(job_id))?;

        if job.status != JobStatus::Ready {
            return Err(DispatcherError::NotReady(job_id));
        }

        let (stream, _size) = self.artifact_store.get_stream(&job.artifact_key).await?;
        Ok(stream)
    }

    /// Read only the schema message at the head of the Arrow IPC stream —
    /// constant-time in result size (spec.md §4.5).
    pub async fn schema(&self, job_id: Uuid) -> Result<Vec<ColumnSchema>, DispatcherError> {
        let job = self
            .registry
            .get_job(job_id)
            .await?
            .ok_or(DispatcherError::NotFound(job_id))?;

        if job.status != JobStatus::Ready {
            return Err(DispatcherError::NotReady(job_id));
        }

        let (stream, _size) = self.artifact_store.get_stream(&job.artifact_key).await?;
        let schema = crate::ipc::read_ipc_stream_schema(stream).await?;

        Ok(schema
            .fields()
            .iter()
            .map(|f| ColumnSchema {
                name: f.name().clone(),
                data_type: format!("{:?}", f.data_type()),
            })
            .collect())
    }

    /// Combine Registry fields with `head(artifact_key)` (spec.md §4.5).
    pub async fn metadata(&self, job_id: Uuid) -> Result<JobMetadata, DispatcherError> {
        let job = self
            .registry
            .get_job(job_id)
            .await?
            .ok_or(DispatcherError::NotFound(job_id))?;

        let head = self.artifact_store.head(&job.artifact_key).await?;
        let columns = if job.status == JobStatus::Ready {
            self.schema(job_id).await.ok()
        } else {
            None
        };
        let num_columns = columns.as_ref().map(|cols| cols.len());

        Ok(JobMetadata {
            job_id: job.job_id,
            columns,
            num_rows: job.row_count,
            num_columns,
            cached: job.status == JobStatus::Ready,
            size: head.as_ref().map(|m| m.size),
            last_modified: head.map(|m| m.last_modified),
            key: job.artifact_key,
        })
    }

    /// Probe the Registry's backing store with a bounded timeout, for
    /// `/health`. `Ok(())` means the store answered within the deadline;
    /// any timeout or error is reported as unhealthy.
    pub async fn health_check(&self) -> Result<(), DispatcherError> {
        match tokio::time::timeout(std::time::Duration::from_secs(5), self.registry.ping()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(DispatcherError::Registry(e)),
            Err(_) => Err(DispatcherError::Registry(crate::registry::RegistryError::Database(
                sqlx::Error::PoolTimedOut,
            ))),
        }
    }

    /// Gauges for `/health` and `/metrics` (spec.md §4.6).
    pub fn queue_depth(&self) -> usize {
        self.worker_pool.queue_depth()
    }

    pub fn active_workers(&self) -> usize {
        self.worker_pool.active_workers()
    }

    /// Drain the worker pool. Call during graceful shutdown.
    pub async fn shutdown(&self, grace: std::time::Duration) {
        self.worker_pool.shutdown(grace).await;
    }
}
