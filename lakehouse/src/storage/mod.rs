pub mod gateway;
pub mod object;

pub use gateway::{BlobGateway, WriteOutcome};
pub use object::{BlobDescriptor, BucketStorage, ObjectStorage, ObjectVersion, WriteCondition};

use common::config::{Settings, StorageBackend, StorageSettings};
use common::{Error, Result};
use object_store::ObjectStore;
use object_store::aws::{AmazonS3Builder, AmazonS3ConfigKey, S3ConditionalPut};
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Hands out one storage handle per bucket, built lazily for the configured
/// backend and cached for the lifetime of the manager.
#[derive(Clone)]
pub struct StorageManager {
    backend: StorageBackend,
    config: StorageSettings,
    store_cache: Arc<dashmap::DashMap<String, Arc<dyn ObjectStorage>>>,
}

impl StorageManager {
    pub fn new(settings: &Settings) -> Self {
        Self::with_backend(settings.storage_backend(), settings.storage.clone())
    }

    pub fn with_backend(backend: StorageBackend, config: StorageSettings) -> Self {
        Self {
            backend,
            config,
            store_cache: Arc::new(dashmap::DashMap::new()),
        }
    }

    /// In-process backend; every bucket lives only as long as the manager.
    pub fn in_memory() -> Self {
        Self::with_backend(StorageBackend::Memory, StorageSettings::default())
    }

    pub fn bucket(&self, bucket: &str) -> Result<Arc<dyn ObjectStorage>> {
        if bucket.trim().is_empty() {
            return Err(Error::InvalidInput("bucket name must not be empty".into()));
        }
        if let Some(storage) = self.store_cache.get(bucket) {
            return Ok(storage.clone());
        }

        let (store, supports_attributes) = self.build_store(bucket)?;
        let storage: Arc<dyn ObjectStorage> =
            Arc::new(BucketStorage::new(bucket, store, supports_attributes));

        // A concurrent caller may have won the race; keep whichever landed first.
        let entry = self
            .store_cache
            .entry(bucket.to_string())
            .or_insert(storage);
        Ok(entry.value().clone())
    }

    fn build_store(&self, bucket: &str) -> Result<(Arc<dyn ObjectStore>, bool)> {
        debug!(bucket, backend = ?self.backend, "Building object store");

        match self.backend {
            StorageBackend::Gcs => {
                let mut builder = GoogleCloudStorageBuilder::from_env().with_bucket_name(bucket);
                if let Some(key) = &self.config.service_account_key {
                    builder = builder.with_service_account_path(key);
                }
                Ok((Arc::new(builder.build()?), true))
            }
            StorageBackend::S3 => Ok((Arc::new(self.s3_builder(bucket).build()?), true)),
            StorageBackend::Local => {
                let root = PathBuf::from(&self.config.local_root).join(bucket);
                std::fs::create_dir_all(&root)?;
                let store = LocalFileSystem::new_with_prefix(&root)?;
                Ok((Arc::new(store), false))
            }
            StorageBackend::Memory => Ok((Arc::new(InMemory::new()), true)),
        }
    }

    /// Create-only and version-matched puts need ETag preconditions enabled.
    fn s3_builder(&self, bucket: &str) -> AmazonS3Builder {
        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .with_conditional_put(S3ConditionalPut::ETagMatch);
        if let Some(region) = &self.config.region {
            builder = builder.with_region(region);
        }
        if let Some(endpoint) = &self.config.endpoint {
            builder = builder.with_endpoint(endpoint).with_allow_http(true);
        }
        if let (Some(access_key), Some(secret_key)) = (&self.config.access_key, &self.config.secret_key) {
            builder = builder
                .with_access_key_id(access_key)
                .with_secret_access_key(secret_key);
        }
        builder
    }
}
