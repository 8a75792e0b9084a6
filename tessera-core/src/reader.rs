use crate::chunk::KeyRange;
use crate::error::{Result, StoreError, TesseraError};
use crate::layout::VersionLayout;
use crate::store::BlobStore;

/// Read side of a version: whether it is published and what its index holds.
pub struct VersionReader<'a> {
    store: &'a dyn BlobStore,
    layout: &'a VersionLayout,
}

impl<'a> VersionReader<'a> {
    pub fn new(store: &'a dyn BlobStore, layout: &'a VersionLayout) -> Self {
        Self { store, layout }
    }

    pub async fn is_published(&self) -> Result<bool> {
        Ok(self.store.exists(&self.layout.marker_path()).await?)
    }

    /// Records of the merged index. Only published versions are read, since an
    /// index without its marker may be incomplete.
    pub async fn load_index(&self) -> Result<Vec<KeyRange>> {
        if !self.is_published().await? {
            return Err(TesseraError::NotPublished(self.layout.dir().to_string()));
        }

        let path = self.layout.merged_index_path();
        let text = match self.store.get_text(&path).await {
            Ok(text) => text,
            Err(StoreError::NotFound { .. }) => {
                return Err(TesseraError::NotPublished(self.layout.dir().to_string()));
            }
            Err(error) => return Err(error.into()),
        };

        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| {
                KeyRange::from_record(line).map_err(|source| TesseraError::CorruptRecord {
                    path: path.clone(),
                    source,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{DataChunk, Version};
    use crate::store::ObjectStoreBackend;
    use crate::uploader::ChunkUploader;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_reads_published_version() {
        let store = Arc::new(ObjectStoreBackend::in_memory());
        let version: Version = "v1".parse().unwrap();
        let uploader = ChunkUploader::new(store.clone(), version, 0, 99, 2).unwrap();

        let reader = VersionReader::new(store.as_ref(), uploader.layout());
        assert!(!reader.is_published().await.unwrap());
        assert!(matches!(
            reader.load_index().await,
            Err(TesseraError::NotPublished(_))
        ));

        uploader
            .upload(DataChunk::new(KeyRange::new("A", 0, 49), "a"))
            .await
            .unwrap();
        uploader
            .upload(DataChunk::new(KeyRange::new("B", 50, 99), "b"))
            .await
            .unwrap();
        uploader.finish().await.unwrap();

        assert!(reader.is_published().await.unwrap());
        let mut ids: Vec<String> = reader
            .load_index()
            .await
            .unwrap()
            .into_iter()
            .map(|range| range.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["A", "B"]);
    }
}
