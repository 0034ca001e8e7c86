//! Error kinds shared across the dispatcher and the HTTP layer.
//!
//! Per-module errors (`RegistryError`, `ArtifactStoreError`, `EngineError`)
//! live next to the modules that raise them; `DispatcherError` is the one
//! the HTTP layer sees and knows how to classify into the codes below.

use thiserror::Error;

/// Codes persisted with `error` jobs and mapped to HTTP statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ExecutionFailed,
    UploadFailed,
    RecoveredOrphan,
    Shutdown,
    Overloaded,
    NotFound,
    NotReady,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ExecutionFailed => "execution_failed",
            ErrorCode::UploadFailed => "upload_failed",
            ErrorCode::RecoveredOrphan => "recovered_orphan",
            ErrorCode::Shutdown => "shutdown",
            ErrorCode::Overloaded => "overloaded",
            ErrorCode::NotFound => "not_found",
            ErrorCode::NotReady => "not_ready",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "execution_failed" => ErrorCode::ExecutionFailed,
            "upload_failed" => ErrorCode::UploadFailed,
            "recovered_orphan" => ErrorCode::RecoveredOrphan,
            "shutdown" => ErrorCode::Shutdown,
            "overloaded" => ErrorCode::Overloaded,
            "not_found" => ErrorCode::NotFound,
            "not_ready" => ErrorCode::NotReady,
            _ => return None,
        })
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors the Dispatcher's public operations can return.
#[derive(Error, Debug)]
pub enum DispatcherError {
    #[error("job {0} not found")]
    NotFound(uuid::Uuid),

    #[error("job {0} is not ready")]
    NotReady(uuid::Uuid),

    #[error("worker pool queue is saturated")]
    Overloaded,

    #[error("registry error: {0}")]
    Registry(#[from] crate::registry::RegistryError),

    #[error("artifact store error: {0}")]
    ArtifactStore(#[from] crate::artifact_store::ArtifactStoreError),
}

impl DispatcherError {
    pub fn code(&self) -> ErrorCode {
        match self {
            DispatcherError::NotFound(_) => ErrorCode::NotFound,
            DispatcherError::NotReady(_) => ErrorCode::NotReady,
            DispatcherError::Overloaded => ErrorCode::Overloaded,
            DispatcherError::Registry(_) => ErrorCode::ExecutionFailed,
            DispatcherError::ArtifactStore(_) => ErrorCode::UploadFailed,
        }
    }
}
