//! Artifact Store — opaque bytes KV of query results, keyed by
//! `{bucket}/{fingerprint}.{format_ext}` (spec.md §4.2).
//!
//! Atomic publish: readers never observe partial artifacts. Single-writer
//! per key is sufficient, guaranteed by the Registry's dedup invariant.

mod error;
mod memory;
mod object_store_backend;

pub use error::ArtifactStoreError;
pub use memory::InMemoryArtifactStore;
pub use object_store_backend::ObjectStoreArtifactStore;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;

/// Result of a `head` call on a key that exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactMeta {
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

pub type ByteStream = BoxStream<'static, Result<Bytes, ArtifactStoreError>>;

/// The key layout function from spec.md §4.2.
pub fn artifact_key(bucket: &str, fingerprint: &str, format_ext: &str) -> String {
    format!("{bucket}/{fingerprint}.{format_ext}")
}

#[async_trait::async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Consume a finite byte-chunk stream and persist it atomically at `key`.
    /// Fails if the producer fails before completion, leaving no partial
    /// object visible.
    async fn put_stream(&self, key: &str, chunks: ByteStream) -> Result<u64, ArtifactStoreError>;

    /// A lazy sequence of byte chunks for `key`, plus a total-size hint.
    async fn get_stream(&self, key: &str) -> Result<(ByteStream, Option<u64>), ArtifactStoreError>;

    /// `{exists, size, last_modified}`, or `None` if absent.
    async fn head(&self, key: &str) -> Result<Option<ArtifactMeta>, ArtifactStoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_key_matches_layout() {
        assert_eq!(
            artifact_key("flight-cache", "deadbeef", "arrow"),
            "flight-cache/deadbeef.arrow"
        );
    }
}
