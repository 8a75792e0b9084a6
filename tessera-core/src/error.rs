use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TesseraError>;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum TesseraError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid version identifier: {0}")]
    InvalidVersion(String),

    #[error("Version {0} has not been published")]
    NotPublished(String),

    #[error("Corrupt index record in {path}: {source}")]
    CorruptRecord {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    #[error("Finish error: {0}")]
    Finish(#[from] FinishError),
}

/// Failures reported by a [`crate::BlobStore`] implementation.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Object not found: {path}")]
    NotFound { path: String },

    #[error("Store operation cancelled")]
    Cancelled,

    #[error("Object {path} is not valid UTF-8")]
    InvalidUtf8 { path: String },

    #[error("Object store error: {0}")]
    Backend(#[from] object_store::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, StoreError::Cancelled)
    }
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Uploader is no longer accepting chunks")]
    Closed,

    #[error("Upload cancelled")]
    Cancelled,

    #[error("Invalid chunk id '{id}': {reason}")]
    InvalidChunkId { id: String, reason: String },

    #[error("Invalid key range for chunk {id}: low {low} > high {high}")]
    InvalidRange { id: String, low: i64, high: i64 },

    #[error(
        "Chunk {id} covers [{low}, {high}] which is outside the uploader span [{span_low}, {span_high}]"
    )]
    OutOfRange {
        id: String,
        low: i64,
        high: i64,
        span_low: i64,
        span_high: i64,
    },

    #[error("Failed to encode index record for chunk {id}: {source}")]
    Encode {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write {path} for chunk {chunk_id}: {source}")]
    Write {
        chunk_id: String,
        path: String,
        #[source]
        source: StoreError,
    },
}

#[derive(Error, Debug)]
pub enum FinishError {
    #[error("Version has already been finished by this uploader")]
    AlreadyFinished,

    #[error("Completion marker {marker} already exists")]
    AlreadyPublished { marker: String },

    #[error("Another finish call is in progress")]
    InProgress,

    #[error("Uploader has been disposed")]
    Closed,

    #[error("Finish cancelled")]
    Cancelled,

    #[error("Failed to list {dir}: {source}")]
    List {
        dir: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to fetch {path}: {source}")]
    Fetch {
        path: String,
        #[source]
        source: StoreError,
    },

    #[error("Corrupt index record in {path}: {source}")]
    CorruptRecord {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Expected {expected} chunk records but found {found}")]
    Incomplete { expected: usize, found: usize },

    #[error("Failed to publish {path}: {source}")]
    Publish {
        path: String,
        #[source]
        source: StoreError,
    },
}

/// Teardown faults. These are logged by the uploader and never returned to callers.
#[derive(Error, Debug)]
pub enum DisposalError {
    #[error("{in_flight} operations still in flight after {timeout:?}")]
    DrainTimeout { in_flight: usize, timeout: Duration },
}
