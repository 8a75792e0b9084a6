use super::{BlobStore, ObjectEntry};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use bytes::Bytes;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use percent_encoding::percent_decode_str;
use std::sync::Arc;

/// [`BlobStore`] over any `object_store` client (S3, local filesystem, memory).
#[derive(Debug, Clone)]
pub struct ObjectStoreBackend {
    inner: Arc<dyn ObjectStore>,
}

impl ObjectStoreBackend {
    pub fn new(inner: Arc<dyn ObjectStore>) -> Self {
        Self { inner }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()))
    }

    pub fn inner(&self) -> &Arc<dyn ObjectStore> {
        &self.inner
    }
}

/// Listed locations come back percent-encoded; callers address objects by the
/// raw path they were written with.
fn decode_part(part: &str) -> String {
    percent_decode_str(part).decode_utf8_lossy().into_owned()
}

fn decode_location(location: &Path) -> String {
    location
        .parts()
        .map(|part| decode_part(part.as_ref()))
        .collect::<Vec<_>>()
        .join("/")
}

fn map_error(path: &str, error: object_store::Error) -> StoreError {
    match error {
        object_store::Error::NotFound { .. } => StoreError::NotFound {
            path: path.to_string(),
        },
        other => StoreError::Backend(other),
    }
}

#[async_trait]
impl BlobStore for ObjectStoreBackend {
    async fn put_object(&self, path: &str, data: Bytes) -> StoreResult<()> {
        let location = Path::from(path);
        self.inner
            .put(&location, PutPayload::from(data))
            .await
            .map_err(|error| map_error(path, error))?;
        Ok(())
    }

    async fn get_object(&self, path: &str) -> StoreResult<Bytes> {
        let location = Path::from(path);
        let result = self
            .inner
            .get(&location)
            .await
            .map_err(|error| map_error(path, error))?;
        result.bytes().await.map_err(|error| map_error(path, error))
    }

    async fn list_objects(&self, dir: &str) -> StoreResult<Vec<ObjectEntry>> {
        let prefix = Path::from(dir);
        let listing = self
            .inner
            .list_with_delimiter(Some(&prefix))
            .await
            .map_err(|error| map_error(dir, error))?;

        let entries = listing
            .objects
            .into_iter()
            .filter_map(|meta| {
                let name = decode_part(meta.location.filename()?);
                Some(ObjectEntry {
                    path: decode_location(&meta.location),
                    name,
                    size: meta.size as u64,
                })
            })
            .collect();

        Ok(entries)
    }

    async fn delete_object_if_exists(&self, path: &str) -> StoreResult<()> {
        let location = Path::from(path);
        match self.inner.delete(&location).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(error) => Err(StoreError::Backend(error)),
        }
    }

    async fn exists(&self, path: &str) -> StoreResult<bool> {
        let location = Path::from(path);
        match self.inner.head(&location).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(error) => Err(StoreError::Backend(error)),
        }
    }
}
