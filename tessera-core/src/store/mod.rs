//! Storage abstraction for Tessera
//!
//! The uploader only needs four blob operations; any object store client can
//! back them. [`ObjectStoreBackend`] adapts the `object_store` crate.

pub mod factory;
pub mod object;

pub use factory::StoreBuilder;
pub use object::ObjectStoreBackend;

use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use bytes::Bytes;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// An object returned by [`BlobStore::list_objects`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    /// Full path of the object.
    pub path: String,
    /// Last path segment.
    pub name: String,
    pub size: u64,
}

/// Minimal key/value blob API used by the uploader.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write an object, replacing any previous content. Durable once this returns.
    async fn put_object(&self, path: &str, data: Bytes) -> StoreResult<()>;

    /// Read a whole object. Fails with [`StoreError::NotFound`] if absent.
    async fn get_object(&self, path: &str) -> StoreResult<Bytes>;

    /// Objects directly under `dir`, in whatever order the store returns them.
    /// Nested directories are not descended into.
    async fn list_objects(&self, dir: &str) -> StoreResult<Vec<ObjectEntry>>;

    /// Delete an object. Deleting a missing object is not an error.
    async fn delete_object_if_exists(&self, path: &str) -> StoreResult<()>;

    async fn get_text(&self, path: &str) -> StoreResult<String> {
        let bytes = self.get_object(path).await?;
        String::from_utf8(bytes.to_vec()).map_err(|_| StoreError::InvalidUtf8 {
            path: path.to_string(),
        })
    }

    async fn exists(&self, path: &str) -> StoreResult<bool> {
        match self.get_object(path).await {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound { .. }) => Ok(false),
            Err(error) => Err(error),
        }
    }
}

pub type DynBlobStore = Arc<dyn BlobStore>;

/// Race a store operation against the uploader's cancellation scope.
pub(crate) async fn cancellable<T, F>(token: &CancellationToken, operation: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(StoreError::Cancelled),
        result = operation => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancellable_passes_result_through() {
        let token = CancellationToken::new();
        let value = cancellable(&token, async { Ok::<_, StoreError>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_cancellable_aborts_pending_operation() {
        let token = CancellationToken::new();
        let child = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            child.cancel();
        });

        let result = cancellable(&token, async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<_, StoreError>(())
        })
        .await;
        assert!(matches!(result, Err(StoreError::Cancelled)));
    }
}
