//! The Query and Job records (spec.md §3) and their wire-adjacent enums.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A Job's position in the state machine of spec.md §4.5.
///
/// Transitions are monotone: pending -> running -> {ready|error}. Never
/// revisits a prior state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Ready,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Ready => "ready",
            JobStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Ready | JobStatus::Error)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Running)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Artifact encoding. `JsonGz` is reserved per spec.md §9 Open Questions —
/// referenced in the original implementation but never reachable, so it is
/// not implemented here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Format {
    ArrowIpcStream,
    JsonGz,
}

impl Format {
    /// The `format_ext` used in the artifact store key layout (spec.md §4.2).
    pub fn extension(&self) -> &'static str {
        match self {
            Format::ArrowIpcStream => "arrow",
            Format::JsonGz => "json.gz",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Format::ArrowIpcStream => "arrow_ipc_stream",
            Format::JsonGz => "json_gz",
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The canonical record of a SQL text seen at least once. Created on first
/// submission of a new fingerprint; never mutated.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Query {
    pub fingerprint: String,
    pub sql: String,
    pub created_at: DateTime<Utc>,
}

/// One execution attempt of a query, tracked through `JobStatus`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Job {
    pub job_id: Uuid,
    pub fingerprint: String,
    pub status: JobStatus,
    pub format: Format,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub row_count: Option<i64>,
    pub artifact_bytes: Option<i64>,
    pub artifact_key: String,
    pub error_code: Option<String>,
}

impl Job {
    pub fn new_pending(job_id: Uuid, fingerprint: String, format: Format, artifact_key: String) -> Self {
        Self {
            job_id,
            fingerprint,
            status: JobStatus::Pending,
            format,
            created_at: Utc::now(),
            completed_at: None,
            row_count: None,
            artifact_bytes: None,
            artifact_key,
            error_code: None,
        }
    }
}
