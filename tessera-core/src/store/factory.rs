use super::{DynBlobStore, ObjectStoreBackend};
use crate::config::{S3Credentials, StoreConfig};
use crate::{Result, TesseraError};
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct StoreBuilder {
    backend: Option<String>,
    namespace: Option<String>,
    local_root: Option<PathBuf>,
    s3_bucket: Option<String>,
    s3_region: Option<String>,
    s3_endpoint: Option<String>,
    s3_credentials: Option<S3Credentials>,
}

impl StoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        let mut builder = Self::new().backend(config.backend.as_str());

        if let Some(namespace) = config.namespace() {
            builder = builder.namespace(namespace);
        }
        if let Some(local) = &config.local {
            builder = builder.local_root(local.root.clone());
        }
        if let Some(s3) = &config.s3 {
            builder = builder.s3_bucket(&s3.bucket).s3_region(&s3.region);
            if let Some(endpoint) = &s3.endpoint {
                builder = builder.s3_endpoint(endpoint);
            }
            if let Some(credentials) = &s3.credentials {
                builder = builder.s3_credentials(credentials.clone());
            }
        }

        builder
    }

    pub fn backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn local_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.local_root = Some(root.into());
        self
    }

    pub fn s3_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.s3_bucket = Some(bucket.into());
        self
    }

    pub fn s3_region(mut self, region: impl Into<String>) -> Self {
        self.s3_region = Some(region.into());
        self
    }

    pub fn s3_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.s3_endpoint = Some(endpoint.into());
        self
    }

    pub fn s3_credentials(mut self, credentials: S3Credentials) -> Self {
        self.s3_credentials = Some(credentials);
        self
    }

    /// Namespace under which version directories are created, if any.
    pub fn resolved_namespace(&self) -> Option<String> {
        self.namespace
            .as_deref()
            .map(|value| value.trim().trim_matches('/'))
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }

    fn resolve_backend(&self) -> Result<String> {
        let backend = self
            .backend
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if backend.is_empty() {
            return Err(TesseraError::Config(
                "store backend cannot be empty".to_string(),
            ));
        }

        Ok(backend)
    }

    pub fn build(&self) -> Result<DynBlobStore> {
        let backend = self.resolve_backend()?;

        match backend.as_str() {
            "memory" => Ok(Arc::new(ObjectStoreBackend::in_memory())),
            "local" => {
                let root = self.local_root.clone().ok_or_else(|| {
                    TesseraError::Config("local root is required for local backend".to_string())
                })?;

                std::fs::create_dir_all(&root).map_err(|error| {
                    TesseraError::Config(format!(
                        "failed to create local root {}: {}",
                        root.display(),
                        error
                    ))
                })?;

                let fs = LocalFileSystem::new_with_prefix(&root)
                    .map_err(|error| TesseraError::Config(error.to_string()))?;
                Ok(Arc::new(ObjectStoreBackend::new(Arc::new(fs))))
            }
            "s3" => {
                let bucket = self.s3_bucket.as_deref().unwrap_or_default().trim();
                if bucket.is_empty() {
                    return Err(TesseraError::Config(
                        "s3 bucket is required for s3 backend".to_string(),
                    ));
                }

                let region = self.s3_region.as_deref().unwrap_or_default().trim();
                if region.is_empty() {
                    return Err(TesseraError::Config(
                        "s3 region is required for s3 backend".to_string(),
                    ));
                }

                let mut s3 = AmazonS3Builder::from_env()
                    .with_bucket_name(bucket)
                    .with_region(region);

                if let Some(endpoint) = self.s3_endpoint.as_deref() {
                    s3 = s3.with_endpoint(endpoint).with_allow_http(true);
                }

                if let Some(credentials) = &self.s3_credentials {
                    s3 = s3
                        .with_access_key_id(&credentials.access_key_id)
                        .with_secret_access_key(&credentials.secret_access_key);
                }

                let client = s3
                    .build()
                    .map_err(|error| TesseraError::Config(error.to_string()))?;
                Ok(Arc::new(ObjectStoreBackend::new(Arc::new(client))))
            }
            other => Err(TesseraError::Config(format!(
                "unsupported store backend: {}",
                other
            ))),
        }
    }
}
