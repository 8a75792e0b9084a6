use crate::chunk::KeyRange;
use crate::config::MergeOrder;
use crate::error::{FinishError, StoreError};
use crate::layout::VersionLayout;
use crate::store::{BlobStore, ObjectEntry, cancellable};
use bytes::Bytes;
use futures_util::future::{join_all, try_join_all};
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;

/// Content of the completion marker object.
pub const FINISHED_MARKER_CONTENT: &str = "finished";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Records in the published index.
    pub records: usize,
    /// Records carried over from an index written by an earlier failed attempt.
    pub recovered: usize,
    pub deleted_partials: usize,
    pub failed_deletes: usize,
}

#[derive(Debug, Clone)]
struct IndexRecord {
    range: KeyRange,
    text: String,
}

/// Folds the per-chunk index records of a version into the merged index and
/// publishes the completion marker.
///
/// Partial records are only deleted once the merged index holds their
/// content, and the marker is always the last write. If an attempt fails
/// after the merged index was written, the next attempt folds that index back
/// in, so retrying never loses records.
pub struct IndexMerger<'a> {
    store: &'a dyn BlobStore,
    layout: &'a VersionLayout,
    cancel: &'a CancellationToken,
    order: MergeOrder,
    expected_chunks: Option<usize>,
}

impl<'a> IndexMerger<'a> {
    pub fn new(
        store: &'a dyn BlobStore,
        layout: &'a VersionLayout,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            store,
            layout,
            cancel,
            order: MergeOrder::default(),
            expected_chunks: None,
        }
    }

    pub fn with_order(mut self, order: MergeOrder) -> Self {
        self.order = order;
        self
    }

    pub fn with_expected_chunks(mut self, expected_chunks: Option<usize>) -> Self {
        self.expected_chunks = expected_chunks;
        self
    }

    pub async fn merge(&self) -> Result<MergeSummary, FinishError> {
        let marker_path = self.layout.marker_path();
        let published = cancellable(self.cancel, self.store.exists(&marker_path))
            .await
            .map_err(|source| fetch_error(&marker_path, source))?;
        if published {
            return Err(FinishError::AlreadyPublished {
                marker: marker_path,
            });
        }

        let partials = self.list_partials().await?;
        let fetched = self.fetch_partials(&partials).await?;
        let mut records = self.recover_previous_index(&fetched).await?;
        let recovered = records.len();
        records.extend(fetched);

        if let Some(expected) = self.expected_chunks {
            if records.len() != expected {
                return Err(FinishError::Incomplete {
                    expected,
                    found: records.len(),
                });
            }
        }

        self.sort_records(&mut records);

        let index_path = self.layout.merged_index_path();
        let merged = records
            .iter()
            .map(|record| record.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        cancellable(
            self.cancel,
            self.store.put_object(&index_path, Bytes::from(merged)),
        )
        .await
        .map_err(|source| publish_error(&index_path, source))?;

        let (deleted_partials, failed_deletes) = self.delete_partials(&partials).await;

        cancellable(
            self.cancel,
            self.store.put_object(
                &marker_path,
                Bytes::from_static(FINISHED_MARKER_CONTENT.as_bytes()),
            ),
        )
        .await
        .map_err(|source| publish_error(&marker_path, source))?;

        tracing::info!(
            "Published index for {} with {} records ({} recovered)",
            self.layout.dir(),
            records.len(),
            recovered
        );

        Ok(MergeSummary {
            records: records.len(),
            recovered,
            deleted_partials,
            failed_deletes,
        })
    }

    async fn list_partials(&self) -> Result<Vec<ObjectEntry>, FinishError> {
        let dir = self.layout.dir();
        let entries = cancellable(self.cancel, self.store.list_objects(dir))
            .await
            .map_err(|source| {
                if source.is_cancelled() {
                    FinishError::Cancelled
                } else {
                    FinishError::List {
                        dir: dir.to_string(),
                        source,
                    }
                }
            })?;

        Ok(entries
            .into_iter()
            .filter(|entry| self.layout.partial_index_chunk_id(&entry.name).is_some())
            .collect())
    }

    async fn fetch_partials(
        &self,
        partials: &[ObjectEntry],
    ) -> Result<Vec<IndexRecord>, FinishError> {
        try_join_all(partials.iter().map(|entry| async move {
            let text = cancellable(self.cancel, self.store.get_text(&entry.path))
                .await
                .map_err(|source| fetch_error(&entry.path, source))?;
            parse_record(&entry.path, text.trim())
        }))
        .await
    }

    async fn recover_previous_index(
        &self,
        fresh: &[IndexRecord],
    ) -> Result<Vec<IndexRecord>, FinishError> {
        let index_path = self.layout.merged_index_path();
        let text = match cancellable(self.cancel, self.store.get_text(&index_path)).await {
            Ok(text) => text,
            Err(StoreError::NotFound { .. }) => return Ok(Vec::new()),
            Err(source) => return Err(fetch_error(&index_path, source)),
        };

        let superseded: HashSet<&str> = fresh
            .iter()
            .map(|record| record.range.id.as_str())
            .collect();
        let mut recovered = Vec::new();
        for line in text.lines().map(str::trim).filter(|line| !line.is_empty()) {
            let record = parse_record(&index_path, line)?;
            if !superseded.contains(record.range.id.as_str()) {
                recovered.push(record);
            }
        }

        if !recovered.is_empty() {
            tracing::warn!(
                "Recovered {} records from an unpublished index at {}",
                recovered.len(),
                index_path
            );
        }

        Ok(recovered)
    }

    fn sort_records(&self, records: &mut [IndexRecord]) {
        match self.order {
            MergeOrder::Listing => {}
            MergeOrder::ChunkId => records.sort_by(|a, b| a.range.id.cmp(&b.range.id)),
            MergeOrder::KeyRange => records.sort_by(|a, b| {
                (a.range.low, a.range.high, &a.range.id).cmp(&(
                    b.range.low,
                    b.range.high,
                    &b.range.id,
                ))
            }),
        }
    }

    async fn delete_partials(&self, partials: &[ObjectEntry]) -> (usize, usize) {
        let results = join_all(partials.iter().map(|entry| async move {
            let result =
                cancellable(self.cancel, self.store.delete_object_if_exists(&entry.path)).await;
            if let Err(error) = &result {
                tracing::warn!("Failed to delete partial index {}: {}", entry.path, error);
            }
            result
        }))
        .await;

        let failed = results.iter().filter(|result| result.is_err()).count();
        (results.len() - failed, failed)
    }
}

fn parse_record(path: &str, text: &str) -> Result<IndexRecord, FinishError> {
    let range = KeyRange::from_record(text).map_err(|source| FinishError::CorruptRecord {
        path: path.to_string(),
        source,
    })?;
    Ok(IndexRecord {
        range,
        text: text.to_string(),
    })
}

fn fetch_error(path: &str, source: StoreError) -> FinishError {
    if source.is_cancelled() {
        return FinishError::Cancelled;
    }
    FinishError::Fetch {
        path: path.to_string(),
        source,
    }
}

fn publish_error(path: &str, source: StoreError) -> FinishError {
    if source.is_cancelled() {
        return FinishError::Cancelled;
    }
    FinishError::Publish {
        path: path.to_string(),
        source,
    }
}
