//! Tessera Core - bounded-concurrency chunk uploads for versioned datasets
//!
//! Producers upload independently built chunks of one dataset version to an
//! object store. Each chunk lands as a payload object plus a partial index
//! record; once every chunk is in, the records are merged into a single
//! index and a completion marker is published.

pub mod chunk;
pub mod config;
pub mod error;
pub mod layout;
pub mod merger;
pub mod reader;
pub mod store;
pub mod uploader;

#[cfg(test)]
mod testing;

pub use chunk::{DataChunk, KeyRange, Version};
pub use config::{
    LocalConfig, MergeOrder, S3Config, S3Credentials, StoreBackend, StoreConfig, UploaderConfig,
};
pub use error::{
    DisposalError, FinishError, Result, StoreError, StoreResult, TesseraError, UploadError,
};
pub use layout::VersionLayout;
pub use merger::{FINISHED_MARKER_CONTENT, IndexMerger, MergeSummary};
pub use reader::VersionReader;
pub use store::{BlobStore, DynBlobStore, ObjectEntry, ObjectStoreBackend, StoreBuilder};
pub use uploader::{ChunkUploader, UploaderState};
