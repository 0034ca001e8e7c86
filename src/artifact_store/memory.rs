//! In-memory `ArtifactStore`, used by tests and as a local-dev fallback.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use chrono::Utc;
use futures::{StreamExt, TryStreamExt};
use tokio::sync::RwLock;

use super::{ArtifactMeta, ArtifactStore, ArtifactStoreError, ByteStream};

#[derive(Default)]
pub struct InMemoryArtifactStore {
    objects: Arc<RwLock<HashMap<String, (Bytes, ArtifactMeta)>>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn put_stream(&self, key: &str, mut chunks: ByteStream) -> Result<u64, ArtifactStoreError> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = chunks.try_next().await? {
            buf.extend_from_slice(&chunk);
        }
        let bytes = buf.freeze();
        let meta = ArtifactMeta {
            size: bytes.len() as u64,
            last_modified: Utc::now(),
        };
        // Publish atomically: only visible once the whole stream has been
        // consumed without error.
        self.objects
            .write()
            .await
            .insert(key.to_string(), (bytes.clone(), meta));
        Ok(bytes.len() as u64)
    }

    async fn get_stream(&self, key: &str) -> Result<(ByteStream, Option<u64>), ArtifactStoreError> {
        let objects = self.objects.read().await;
        let (bytes, meta) = objects
            .get(key)
            .ok_or_else(|| ArtifactStoreError::NotFound(key.to_string()))?;
        let size = meta.size;
        let bytes = bytes.clone();
        let stream = futures::stream::once(async move { Ok(bytes) }).boxed();
        Ok((stream, Some(size)))
    }

    async fn head(&self, key: &str) -> Result<Option<ArtifactMeta>, ArtifactStoreError> {
        Ok(self.objects.read().await.get(key).map(|(_, meta)| meta.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn chunks(parts: &[&str]) -> ByteStream {
        let owned: Vec<Result<Bytes, ArtifactStoreError>> = parts
            .iter()
            .map(|p| Ok(Bytes::from(p.as_bytes().to_vec())))
            .collect();
        stream::iter(owned).boxed()
    }

    #[tokio::test]
    async fn head_is_none_before_put() {
        let store = InMemoryArtifactStore::new();
        assert!(store.head("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_then_get_round_trips_bytes() {
        let store = InMemoryArtifactStore::new();
        store.put_stream("k", chunks(&["hello", " ", "world"])).await.unwrap();

        let (mut stream, size) = store.get_stream("k").await.unwrap();
        let mut collected = Vec::new();
        while let Some(chunk) = stream.try_next().await.unwrap() {
            collected.extend_from_slice(&chunk);
        }
        assert_eq!(collected, b"hello world");
        assert_eq!(size, Some(11));
    }

    #[tokio::test]
    async fn head_reports_size_and_existence_after_put() {
        let store = InMemoryArtifactStore::new();
        store.put_stream("k", chunks(&["abc"])).await.unwrap();
        let meta = store.head("k").await.unwrap().unwrap();
        assert_eq!(meta.size, 3);
    }

    #[tokio::test]
    async fn get_stream_on_missing_key_fails() {
        let store = InMemoryArtifactStore::new();
        assert!(store.get_stream("missing").await.is_err());
    }

    #[tokio::test]
    async fn failed_producer_leaves_no_partial_object() {
        let store = InMemoryArtifactStore::new();
        let failing: ByteStream = stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(ArtifactStoreError::UploadAborted("boom".into())),
        ])
        .boxed();

        let result = store.put_stream("k", failing).await;
        assert!(result.is_err());
        assert!(store.head("k").await.unwrap().is_none());
    }
}
