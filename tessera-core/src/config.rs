use crate::error::{Result, TesseraError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Tuning for a single [`crate::ChunkUploader`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploaderConfig {
    #[serde(default = "default_max_concurrent_uploads")]
    pub max_concurrent_uploads: usize,
    #[serde(default = "default_index_prefix")]
    pub index_prefix: String,
    #[serde(default = "default_finished_marker")]
    pub finished_marker: String,
    #[serde(default)]
    pub merge_order: MergeOrder,
    /// When set, `finish` refuses to publish unless exactly this many chunk
    /// records are present.
    #[serde(default)]
    pub expected_chunks: Option<usize>,
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            max_concurrent_uploads: default_max_concurrent_uploads(),
            index_prefix: default_index_prefix(),
            finished_marker: default_finished_marker(),
            merge_order: MergeOrder::default(),
            expected_chunks: None,
            drain_timeout_ms: default_drain_timeout_ms(),
        }
    }
}

impl UploaderConfig {
    pub fn with_max_concurrent_uploads(mut self, max: usize) -> Self {
        self.max_concurrent_uploads = max;
        self
    }

    pub fn with_merge_order(mut self, order: MergeOrder) -> Self {
        self.merge_order = order;
        self
    }

    pub fn with_expected_chunks(mut self, expected: usize) -> Self {
        self.expected_chunks = Some(expected);
        self
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_uploads == 0 {
            return Err(TesseraError::Config(
                "max_concurrent_uploads must be at least 1".to_string(),
            ));
        }
        if self.max_concurrent_uploads > u32::MAX as usize
            || self.max_concurrent_uploads > tokio::sync::Semaphore::MAX_PERMITS
        {
            return Err(TesseraError::Config(format!(
                "max_concurrent_uploads {} is too large",
                self.max_concurrent_uploads
            )));
        }

        for (field, value) in [
            ("index_prefix", &self.index_prefix),
            ("finished_marker", &self.finished_marker),
        ] {
            if value.trim().is_empty() {
                return Err(TesseraError::Config(format!("{} cannot be empty", field)));
            }
            if value.contains('/') {
                return Err(TesseraError::Config(format!(
                    "{} '{}' must not contain '/'",
                    field, value
                )));
            }
        }

        if self.finished_marker == self.index_prefix
            || self
                .finished_marker
                .starts_with(&format!("{}_", self.index_prefix))
        {
            return Err(TesseraError::Config(format!(
                "finished_marker '{}' collides with index_prefix '{}'",
                self.finished_marker, self.index_prefix
            )));
        }

        Ok(())
    }
}

fn default_max_concurrent_uploads() -> usize {
    4
}

fn default_index_prefix() -> String {
    "index".to_string()
}

fn default_finished_marker() -> String {
    "finished".to_string()
}

fn default_drain_timeout_ms() -> u64 {
    5_000
}

/// Record order of the merged index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeOrder {
    /// Whatever order the store's listing returns.
    #[default]
    Listing,
    ChunkId,
    KeyRange,
}

/// Object store backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub local: Option<LocalConfig>,
    #[serde(default)]
    pub s3: Option<S3Config>,
}

impl StoreConfig {
    pub fn namespace(&self) -> Option<&str> {
        self.namespace
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Local,
    S3,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreBackend::Memory => "memory",
            StoreBackend::Local => "local",
            StoreBackend::S3 => "s3",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    pub root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    pub credentials: Option<S3Credentials>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}
