//! Production `ArtifactStore` backend on top of the `object_store` crate,
//! configured for an S3-compatible endpoint (minio-friendly).

use futures::{StreamExt, TryStreamExt};
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{MultipartUpload, ObjectStore, PutPayload};
use tracing::warn;

use crate::config::ObjectStoreConfig;

use super::{ArtifactMeta, ArtifactStore, ArtifactStoreError, ByteStream};

pub struct ObjectStoreArtifactStore {
    store: Box<dyn ObjectStore>,
}

impl ObjectStoreArtifactStore {
    pub fn new(config: &ObjectStoreConfig) -> Result<Self, object_store::Error> {
        let store = AmazonS3Builder::new()
            .with_bucket_name(&config.bucket)
            .with_endpoint(&config.endpoint)
            .with_access_key_id(&config.access_key)
            .with_secret_access_key(&config.secret_key)
            .with_region(&config.region)
            .with_allow_http(true)
            .build()?;
        Ok(Self {
            store: Box::new(store),
        })
    }
}

#[async_trait::async_trait]
impl ArtifactStore for ObjectStoreArtifactStore {
    async fn put_stream(&self, key: &str, mut chunks: ByteStream) -> Result<u64, ArtifactStoreError> {
        let path = ObjectPath::from(key);
        let mut upload = self.store.put_multipart(&path).await?;
        let mut total: u64 = 0;

        loop {
            match chunks.try_next().await {
                Ok(Some(chunk)) => {
                    total += chunk.len() as u64;
                    if let Err(e) = upload.put_part(PutPayload::from_bytes(chunk)).await {
                        let _ = upload.abort().await;
                        return Err(e.into());
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    if let Err(abort_err) = upload.abort().await {
                        warn!(error = %abort_err, "failed to abort multipart upload after producer error");
                    }
                    return Err(e);
                }
            }
        }

        upload.complete().await?;
        Ok(total)
    }

    async fn get_stream(&self, key: &str) -> Result<(ByteStream, Option<u64>), ArtifactStoreError> {
        let path = ObjectPath::from(key);
        let result = self.store.get(&path).await?;
        let size = Some(result.meta.size as u64);
        let stream = result
            .into_stream()
            .map(|chunk| chunk.map_err(ArtifactStoreError::from))
            .boxed();
        Ok((stream, size))
    }

    async fn head(&self, key: &str) -> Result<Option<ArtifactMeta>, ArtifactStoreError> {
        let path = ObjectPath::from(key);
        match self.store.head(&path).await {
            Ok(meta) => Ok(Some(ArtifactMeta {
                size: meta.size as u64,
                last_modified: meta.last_modified,
            })),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
