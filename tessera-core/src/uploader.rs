use crate::chunk::{DataChunk, Version};
use crate::config::UploaderConfig;
use crate::error::{DisposalError, FinishError, Result, TesseraError, UploadError};
use crate::layout::VersionLayout;
use crate::merger::{IndexMerger, MergeSummary};
use crate::store::{DynBlobStore, cancellable};
use bytes::Bytes;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UploaderState {
    /// Accepting uploads.
    Active = 0,
    /// Inside `finish`; no new uploads are admitted.
    Finishing = 1,
    /// Index and completion marker are durable.
    Finished = 2,
    /// Torn down; in-flight work was cancelled.
    Disposed = 3,
}

impl UploaderState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => UploaderState::Active,
            1 => UploaderState::Finishing,
            2 => UploaderState::Finished,
            _ => UploaderState::Disposed,
        }
    }
}

/// Uploads the chunks of one version and publishes their merged index.
///
/// Any number of producers may call [`ChunkUploader::upload`] concurrently;
/// at most `max_concurrent_uploads` of them write to the store at a time.
/// [`ChunkUploader::finish`] waits for in-flight uploads, stops admitting new
/// ones, and publishes the merged index followed by the completion marker.
pub struct ChunkUploader {
    store: DynBlobStore,
    version: Version,
    layout: VersionLayout,
    key_low: i64,
    key_high: i64,
    config: UploaderConfig,
    permits: Semaphore,
    max_permits: u32,
    cancel: CancellationToken,
    tracker: TaskTracker,
    state: AtomicU8,
}

impl ChunkUploader {
    pub fn new(
        store: DynBlobStore,
        version: Version,
        key_low: i64,
        key_high: i64,
        max_concurrent_uploads: usize,
    ) -> Result<Self> {
        let config = UploaderConfig::default().with_max_concurrent_uploads(max_concurrent_uploads);
        Self::with_config(store, version, key_low, key_high, config)
    }

    pub fn with_config(
        store: DynBlobStore,
        version: Version,
        key_low: i64,
        key_high: i64,
        config: UploaderConfig,
    ) -> Result<Self> {
        config.validate()?;
        if key_low > key_high {
            return Err(TesseraError::Config(format!(
                "key range low {} is greater than high {}",
                key_low, key_high
            )));
        }

        let max_permits = u32::try_from(config.max_concurrent_uploads).map_err(|_| {
            TesseraError::Config(format!(
                "max_concurrent_uploads {} is too large",
                config.max_concurrent_uploads
            ))
        })?;
        let layout = VersionLayout::from_config(None, &version, &config);

        Ok(Self {
            store,
            version,
            layout,
            key_low,
            key_high,
            permits: Semaphore::new(config.max_concurrent_uploads),
            max_permits,
            config,
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
            state: AtomicU8::new(UploaderState::Active as u8),
        })
    }

    /// Place the version directory under `namespace`.
    pub fn in_namespace(mut self, namespace: &str) -> Self {
        self.layout = VersionLayout::from_config(Some(namespace), &self.version, &self.config);
        self
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn layout(&self) -> &VersionLayout {
        &self.layout
    }

    pub fn key_span(&self) -> (i64, i64) {
        (self.key_low, self.key_high)
    }

    pub fn state(&self) -> UploaderState {
        UploaderState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Number of `upload`/`finish` calls currently running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Write the chunk payload and its partial index record.
    ///
    /// Suspends until an admission permit is free. The permit is held for the
    /// duration of both writes and released on every exit path. Uploading an
    /// id again overwrites the earlier payload and record.
    pub async fn upload(&self, chunk: DataChunk) -> std::result::Result<(), UploadError> {
        let _tracked = self.tracker.token();

        if self.state() != UploaderState::Active {
            return Err(UploadError::Closed);
        }
        self.check_chunk(&chunk)?;

        let _permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(UploadError::Cancelled),
            permit = self.permits.acquire() => permit.map_err(|_| UploadError::Closed)?,
        };

        let DataChunk { range, payload } = chunk;
        let record = range.to_record().map_err(|source| UploadError::Encode {
            id: range.id.clone(),
            source,
        })?;

        let payload_path = self.layout.payload_path(&range.id);
        let index_path = self.layout.partial_index_path(&range.id);
        let size = payload.len();

        let (payload_result, index_result) = tokio::join!(
            cancellable(&self.cancel, self.store.put_object(&payload_path, payload)),
            cancellable(
                &self.cancel,
                self.store.put_object(&index_path, Bytes::from(record))
            )
        );

        let (failed_path, source) = match (payload_result, index_result) {
            (Ok(()), Ok(())) => {
                tracing::debug!(
                    "Uploaded chunk {} ({} bytes) for version {}",
                    range.id,
                    size,
                    self.version
                );
                return Ok(());
            }
            (Err(source), index_result) => {
                if let Err(error) = index_result {
                    tracing::debug!("Index write for chunk {} also failed: {}", range.id, error);
                }
                (payload_path, source)
            }
            (Ok(()), Err(source)) => (index_path.clone(), source),
        };

        if source.is_cancelled() {
            return Err(UploadError::Cancelled);
        }

        // Drop the record so a later finish cannot index a chunk whose payload
        // write failed.
        if let Err(error) =
            cancellable(&self.cancel, self.store.delete_object_if_exists(&index_path)).await
        {
            tracing::warn!(
                "Failed to remove index record {} after failed upload: {}",
                index_path,
                error
            );
        }

        Err(UploadError::Write {
            chunk_id: range.id,
            path: failed_path,
            source,
        })
    }

    /// Merge the partial index records and publish the completion marker.
    ///
    /// Waits for every in-flight upload to return first. On success the
    /// uploader is `Finished` and rejects further uploads; on failure it goes
    /// back to `Active` and `finish` may be called again.
    pub async fn finish(&self) -> std::result::Result<MergeSummary, FinishError> {
        let _tracked = self.tracker.token();
        self.begin_finishing()?;

        let result = self.drain_and_merge().await;
        match &result {
            Ok(summary) => {
                self.transition(UploaderState::Finishing, UploaderState::Finished);
                tracing::info!(
                    "Finished version {} with {} chunks",
                    self.version,
                    summary.records
                );
            }
            Err(error) => {
                self.transition(UploaderState::Finishing, UploaderState::Active);
                tracing::warn!("Finishing version {} failed: {}", self.version, error);
            }
        }

        result
    }

    async fn drain_and_merge(&self) -> std::result::Result<MergeSummary, FinishError> {
        let _drained = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(FinishError::Cancelled),
            permits = self.permits.acquire_many(self.max_permits) => {
                permits.map_err(|_| FinishError::Closed)?
            }
        };

        let summary = IndexMerger::new(self.store.as_ref(), &self.layout, &self.cancel)
            .with_order(self.config.merge_order)
            .with_expected_chunks(self.config.expected_chunks)
            .merge()
            .await?;

        // Close while the permits are still held so no queued upload can
        // write after the marker.
        self.permits.close();
        Ok(summary)
    }

    fn begin_finishing(&self) -> std::result::Result<(), FinishError> {
        match self.state.compare_exchange(
            UploaderState::Active as u8,
            UploaderState::Finishing as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => Ok(()),
            Err(current) => Err(match UploaderState::from_u8(current) {
                UploaderState::Finishing => FinishError::InProgress,
                UploaderState::Finished => FinishError::AlreadyFinished,
                UploaderState::Active | UploaderState::Disposed => FinishError::Closed,
            }),
        }
    }

    fn transition(&self, from: UploaderState, to: UploaderState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn check_chunk(&self, chunk: &DataChunk) -> std::result::Result<(), UploadError> {
        let range = &chunk.range;
        self.layout
            .validate_chunk_id(&range.id)
            .map_err(|reason| UploadError::InvalidChunkId {
                id: range.id.clone(),
                reason,
            })?;

        if range.low > range.high {
            return Err(UploadError::InvalidRange {
                id: range.id.clone(),
                low: range.low,
                high: range.high,
            });
        }

        if !range.is_within(self.key_low, self.key_high) {
            return Err(UploadError::OutOfRange {
                id: range.id.clone(),
                low: range.low,
                high: range.high,
                span_low: self.key_low,
                span_high: self.key_high,
            });
        }

        Ok(())
    }

    /// Cancel in-flight work and stop admitting uploads. Safe to call more
    /// than once; never fails.
    pub fn dispose(&self) {
        let _ = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                match UploaderState::from_u8(current) {
                    UploaderState::Active | UploaderState::Finishing => {
                        Some(UploaderState::Disposed as u8)
                    }
                    UploaderState::Finished | UploaderState::Disposed => None,
                }
            });

        if self.cancel.is_cancelled() {
            return;
        }

        self.cancel.cancel();
        self.permits.close();
        self.tracker.close();
        tracing::debug!(
            "Disposed uploader for version {} ({} operations in flight)",
            self.version,
            self.tracker.len()
        );
    }

    /// [`ChunkUploader::dispose`], then wait up to the configured drain timeout
    /// for in-flight operations to unwind. Faults are logged, not returned.
    pub async fn shutdown(&self) {
        self.dispose();
        if let Err(error) = self.wait_drained(self.config.drain_timeout()).await {
            tracing::error!(
                "Error while disposing uploader for version {}: {}",
                self.version,
                error
            );
        }
    }

    async fn wait_drained(&self, timeout: Duration) -> std::result::Result<(), DisposalError> {
        tokio::time::timeout(timeout, self.tracker.wait())
            .await
            .map_err(|_| DisposalError::DrainTimeout {
                in_flight: self.tracker.len(),
                timeout,
            })
    }
}

impl Drop for ChunkUploader {
    fn drop(&mut self) {
        self.dispose();
    }
}
