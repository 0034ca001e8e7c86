use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArtifactStoreError {
    #[error("object store error: {0}")]
    Backend(#[from] object_store::Error),

    #[error("upload aborted: {0}")]
    UploadAborted(String),

    #[error("key not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
