//! Uploader contract consumed by the storage engine.
//!
//! An uploader owns the bucket credentials and the object path template,
//! and remembers the handle produced by the last successful store so a
//! retrieve in the same lifecycle needs no round-trip.

use crate::config::{Config, QcloudConfig, UploaderConfig};
use crate::errors::StorageResult;
use crate::storage::credentials::Credentials;
use crate::storage::engine::{RetrievedFile, StorageEngine, StoredFile};
use crate::storage::file::{LocalFile, RemoteFile};

/// Accessors the storage engine reads from the owning uploader.
pub trait Uploader: Send + Sync {
    fn qcloud_app_id(&self) -> &str;
    fn qcloud_secret_id(&self) -> &str;
    fn qcloud_secret_key(&self) -> &str;
    fn qcloud_bucket_host(&self) -> &str;

    /// Content type forced onto every upload, if any.
    fn content_type(&self) -> Option<&str>;

    /// Object path for `identifier`.  Must be deterministic.
    fn store_path(&self, identifier: &str) -> String;

    /// Handle cached by a preceding store.
    fn file(&self) -> Option<&RemoteFile>;

    /// Snapshot the accessors into one immutable value.
    fn credentials(&self) -> Credentials {
        Credentials {
            app_id: self.qcloud_app_id().to_string(),
            secret_id: self.qcloud_secret_id().to_string(),
            secret_key: self.qcloud_secret_key().to_string(),
            bucket_host: self.qcloud_bucket_host().to_string(),
            content_type: self.content_type().map(str::to_string),
        }
    }
}

/// Uploader driven by the YAML configuration.
///
/// Objects land at `/{store_dir}/{identifier}`.
#[derive(Debug, Clone)]
pub struct ConfiguredUploader {
    qcloud: QcloudConfig,
    store_dir: String,
    cached: Option<RemoteFile>,
}

impl ConfiguredUploader {
    pub fn new(qcloud: QcloudConfig, uploader: &UploaderConfig) -> Self {
        Self {
            qcloud,
            store_dir: uploader.store_dir.trim_matches('/').to_string(),
            cached: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.qcloud.clone(), &config.uploader)
    }

    /// Store `file` through `engine`, caching the handle when COS accepts it.
    ///
    /// A rejected upload leaves any earlier cached handle untouched.
    pub async fn store_file<E: StorageEngine>(
        &mut self,
        engine: &E,
        file: LocalFile,
        identifier: &str,
    ) -> StorageResult<StoredFile> {
        let stored = engine.store(&*self, file, identifier).await?;
        if stored.outcome.success {
            self.cached = Some(stored.file.clone());
        }
        Ok(stored)
    }

    /// Retrieve `identifier` through `engine`, served from the cache if set.
    pub async fn retrieve_from_store<E: StorageEngine>(
        &self,
        engine: &E,
        identifier: &str,
    ) -> StorageResult<RetrievedFile> {
        engine.retrieve(self, identifier).await
    }

    /// Forget the cached handle so the next retrieve asks COS.
    pub fn clear_cache(&mut self) {
        self.cached = None;
    }
}

impl Uploader for ConfiguredUploader {
    fn qcloud_app_id(&self) -> &str {
        &self.qcloud.app_id
    }

    fn qcloud_secret_id(&self) -> &str {
        &self.qcloud.secret_id
    }

    fn qcloud_secret_key(&self) -> &str {
        &self.qcloud.secret_key
    }

    fn qcloud_bucket_host(&self) -> &str {
        &self.qcloud.bucket_host
    }

    fn content_type(&self) -> Option<&str> {
        self.qcloud.content_type.as_deref()
    }

    fn store_path(&self, identifier: &str) -> String {
        let identifier = identifier.trim_start_matches('/');
        if self.store_dir.is_empty() {
            format!("/{identifier}")
        } else {
            format!("/{}/{}", self.store_dir, identifier)
        }
    }

    fn file(&self) -> Option<&RemoteFile> {
        self.cached.as_ref()
    }
}
