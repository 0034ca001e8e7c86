//! Job Registry — durable mapping fingerprint -> canonical job, job -> state.
//!
//! See spec.md §4.3. All mutating operations are serialized per row; the
//! SQLite backend in `sqlite_registry` is the only implementation shipped.

mod error;
mod job;
mod sqlite_registry;

pub use error::RegistryError;
pub use job::{Format, Job, JobStatus, Query};
pub use sqlite_registry::SqliteRegistry;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Fields a `transition` call may set on a terminal or intermediate state change.
#[derive(Debug, Clone, Default)]
pub struct TransitionPatch {
    pub completed_at: Option<DateTime<Utc>>,
    pub row_count: Option<i64>,
    pub artifact_bytes: Option<i64>,
    pub error_code: Option<String>,
}

/// A durable mapping with serializable semantics (spec.md §4.3).
#[async_trait::async_trait]
pub trait JobRegistry: Send + Sync {
    /// Idempotent insert of a Query row. Returns its fingerprint.
    async fn upsert_query(&self, sql: &str) -> Result<String, RegistryError>;

    async fn get_query(&self, fingerprint: &str) -> Result<Option<Query>, RegistryError>;

    /// Atomic: if an active (pending/running) or ready Job exists for
    /// `fingerprint`, return it with `created=false`; else insert a pending
    /// Job and return it with `created=true`. The critical section that
    /// enforces "at most one active job per fingerprint".
    async fn claim_or_find(
        &self,
        fingerprint: &str,
        new_job_id: Uuid,
        format: Format,
        artifact_key: &str,
    ) -> Result<(Job, bool), RegistryError>;

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, RegistryError>;

    /// Most-recent Job for a fingerprint, by `created_at`.
    async fn latest_job_for(&self, fingerprint: &str) -> Result<Option<Job>, RegistryError>;

    /// Compare-and-set state transition. Returns true iff the row matched `from`.
    async fn transition(
        &self,
        job_id: Uuid,
        from: JobStatus,
        to: JobStatus,
        patch: TransitionPatch,
    ) -> Result<bool, RegistryError>;

    /// Startup reconciliation: any job in `pending`/`running` becomes
    /// `error(recovered_orphan)`, because the worker that owned it is gone.
    /// Returns the number of jobs reconciled.
    async fn reconcile_orphans(&self) -> Result<u64, RegistryError>;

    /// Cheapest possible liveness probe against the backing store, used by
    /// `/health`. Must not take any lock `claim_or_find` holds.
    async fn ping(&self) -> Result<(), RegistryError>;
}
