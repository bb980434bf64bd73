//! The COS storage engine: `store` and `retrieve` hooks.
//!
//! Each hook follows the same steps:
//!   1. bind a client to the uploader's current credentials
//!   2. build the object key from the uploader's path template
//!   3. forward to the bound client through a [`RemoteFile`]
//!
//! Binding happens per call and yields a client owned by that call, so two
//! uploads with different credentials can run concurrently without ever
//! observing each other's configuration.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info_span, Instrument};

use super::client::{ClientFactory, ObjectClient};
use super::credentials::Credentials;
use super::file::{LocalFile, RemoteFile, StatResult};
use crate::errors::{Outcome, StorageError, StorageResult};
use crate::uploader::Uploader;

/// Result of the `store` hook.
#[derive(Debug, Clone)]
pub struct StoredFile {
    /// Handle to the uploaded object.
    pub file: RemoteFile,
    /// Status of the upload; callers must check `success`.
    pub outcome: Outcome,
}

/// Result of the `retrieve` hook.
#[derive(Debug, Clone)]
pub struct RetrievedFile {
    /// Handle to the object.
    pub file: RemoteFile,
    /// Metadata lookup, or `None` when served from the uploader's cache.
    pub stat: Option<StatResult>,
}

/// Boxed future returned by [`StorageEngine`] hooks.
pub type EngineFuture<'a, T> = Pin<Box<dyn Future<Output = StorageResult<T>> + Send + 'a>>;

/// Hooks a pluggable storage backend provides to the upload library.
pub trait StorageEngine: Send + Sync + 'static {
    /// Persist `file` under the key derived from `identifier`.
    fn store<'a>(
        &'a self,
        uploader: &'a dyn Uploader,
        file: LocalFile,
        identifier: &'a str,
    ) -> EngineFuture<'a, StoredFile>;

    /// Obtain a handle for the object stored under `identifier`.
    fn retrieve<'a>(
        &'a self,
        uploader: &'a dyn Uploader,
        identifier: &'a str,
    ) -> EngineFuture<'a, RetrievedFile>;
}

/// Bind a client to `credentials`.
///
/// The returned client is independent of every other binding; rejected
/// credentials surface as [`StorageError::InvalidCredentials`].
pub fn bind(
    factory: &dyn ClientFactory,
    credentials: &Credentials,
) -> StorageResult<Arc<dyn ObjectClient>> {
    let client = factory.connect(credentials)?;
    debug!(host = client.host(), app_id = %credentials.app_id, "bound COS client");
    Ok(client)
}

/// Object key for `identifier` under the uploader's path template.
///
/// The key must be an absolute object path: it starts with `/`, names an
/// object rather than a directory, and has no `.` or `..` segments (URL
/// normalization would otherwise move the request onto another object).
pub fn build_key(uploader: &dyn Uploader, identifier: &str) -> StorageResult<String> {
    if identifier.is_empty() {
        return Err(StorageError::InvalidIdentifier);
    }
    let key = uploader.store_path(identifier);
    let problem = if key.is_empty() {
        Some("path template produced an empty key")
    } else if !key.starts_with('/') {
        Some("key must start with '/'")
    } else if key.ends_with('/') {
        Some("key names a directory, not an object")
    } else if key.split('/').any(|segment| segment == "." || segment == "..") {
        Some("key contains a '.' or '..' segment")
    } else {
        None
    };
    match problem {
        Some(message) => Err(StorageError::InvalidKey {
            key,
            message: message.to_string(),
        }),
        None => Ok(key),
    }
}

/// COS storage engine over any [`ClientFactory`].
pub struct QcloudStorage<F> {
    factory: F,
}

impl<F: ClientFactory> QcloudStorage<F> {
    pub fn new(factory: F) -> Self {
        Self { factory }
    }

    /// Factory used to bind clients.
    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Build a handle for `identifier` without contacting COS.
    pub fn handle(&self, uploader: &dyn Uploader, identifier: &str) -> StorageResult<RemoteFile> {
        let credentials = uploader.credentials();
        let client = bind(&self.factory, &credentials)?;
        let key = build_key(uploader, identifier)?;
        Ok(RemoteFile::new(client, key, None).with_content_type(credentials.content_type))
    }
}

impl<F: ClientFactory> StorageEngine for QcloudStorage<F> {
    fn store<'a>(
        &'a self,
        uploader: &'a dyn Uploader,
        file: LocalFile,
        identifier: &'a str,
    ) -> EngineFuture<'a, StoredFile> {
        let span = info_span!("store", identifier);
        Box::pin(
            async move {
                let credentials = uploader.credentials();
                let client = bind(&self.factory, &credentials)?;
                let key = build_key(uploader, identifier)?;

                let remote = RemoteFile::new(client, key, Some(file))
                    .with_content_type(credentials.content_type);
                let outcome = remote.store().await?;
                Ok(StoredFile {
                    file: remote,
                    outcome,
                })
            }
            .instrument(span),
        )
    }

    fn retrieve<'a>(
        &'a self,
        uploader: &'a dyn Uploader,
        identifier: &'a str,
    ) -> EngineFuture<'a, RetrievedFile> {
        let span = info_span!("retrieve", identifier);
        Box::pin(
            async move {
                let credentials = uploader.credentials();
                let client = bind(&self.factory, &credentials)?;

                if let Some(cached) = uploader.file() {
                    debug!(path = cached.path(), "retrieve served from uploader cache");
                    return Ok(RetrievedFile {
                        file: cached.clone(),
                        stat: None,
                    });
                }

                let key = build_key(uploader, identifier)?;
                let remote = RemoteFile::new(client, key, None)
                    .with_content_type(credentials.content_type);
                let stat = remote.stat().await?;
                Ok(RetrievedFile {
                    file: remote,
                    stat: Some(stat),
                })
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::testing::{credentials, Call, FakeFactory, Script};
    use reqwest::StatusCode;
    use std::time::Duration;

    /// Minimal uploader with a fixed credential set.
    struct TestUploader {
        credentials: Credentials,
        dir: String,
        /// Drop the leading '/' from generated paths.
        relative: bool,
        cached: Option<RemoteFile>,
    }

    impl TestUploader {
        fn new(secret_id: &str, host: &str, dir: &str) -> Self {
            Self {
                credentials: credentials(secret_id, host),
                dir: dir.to_string(),
                relative: false,
                cached: None,
            }
        }
    }

    impl Uploader for TestUploader {
        fn qcloud_app_id(&self) -> &str {
            &self.credentials.app_id
        }
        fn qcloud_secret_id(&self) -> &str {
            &self.credentials.secret_id
        }
        fn qcloud_secret_key(&self) -> &str {
            &self.credentials.secret_key
        }
        fn qcloud_bucket_host(&self) -> &str {
            &self.credentials.bucket_host
        }
        fn content_type(&self) -> Option<&str> {
            self.credentials.content_type.as_deref()
        }
        fn store_path(&self, identifier: &str) -> String {
            let path = format!("/{}/{}", self.dir, identifier);
            if self.relative {
                path.trim_start_matches('/').to_string()
            } else {
                path
            }
        }
        fn file(&self) -> Option<&RemoteFile> {
            self.cached.as_ref()
        }
    }

    const HOST: &str = "https://bucket.example.com";

    fn photo() -> LocalFile {
        LocalFile::from_bytes("photo.png", "hello world")
    }

    #[test]
    fn test_build_key_is_deterministic() {
        let uploader = TestUploader::new("AKID-A", HOST, "uploads/1");
        let first = build_key(&uploader, "photo.png").unwrap();
        let second = build_key(&uploader, "photo.png").unwrap();
        assert_eq!(first, second);
        assert_eq!(first, "/uploads/1/photo.png");
    }

    #[test]
    fn test_build_key_rejects_empty_identifier() {
        let uploader = TestUploader::new("AKID-A", HOST, "uploads");
        assert!(matches!(
            build_key(&uploader, ""),
            Err(StorageError::InvalidIdentifier)
        ));
    }

    fn assert_invalid_key(result: StorageResult<String>) {
        match result {
            Err(StorageError::InvalidKey { .. }) => {}
            other => panic!("expected InvalidKey, got {other:?}"),
        }
    }

    #[test]
    fn test_build_key_rejects_relative_template() {
        let mut uploader = TestUploader::new("AKID-A", HOST, "uploads/1");
        uploader.relative = true;
        assert_eq!(uploader.store_path("photo.png"), "uploads/1/photo.png");
        assert_invalid_key(build_key(&uploader, "photo.png"));
    }

    #[test]
    fn test_build_key_rejects_identifier_that_trims_to_nothing() {
        let yaml = r#"
qcloud:
  app_id: "1250000000"
  secret_id: AKIDexample
  secret_key: secret
  bucket_host: https://bucket.example.com
uploader:
  store_dir: uploads
"#;
        let config = crate::config::parse_config(yaml).unwrap();
        let uploader = crate::uploader::ConfiguredUploader::from_config(&config);
        assert_eq!(uploader.store_path("/"), "/uploads/");
        assert_invalid_key(build_key(&uploader, "/"));
    }

    #[test]
    fn test_build_key_rejects_dot_segments() {
        let uploader = TestUploader::new("AKID-A", HOST, "uploads");
        assert_invalid_key(build_key(&uploader, "../secret.png"));
        assert_invalid_key(build_key(&uploader, "./photo.png"));
        assert_invalid_key(build_key(&uploader, "a/../../secret.png"));
        // Dots inside a segment are ordinary characters.
        assert_eq!(
            build_key(&uploader, "..photo.png").unwrap(),
            "/uploads/..photo.png"
        );
    }

    #[tokio::test]
    async fn test_traversal_identifier_reaches_no_client() {
        let storage = QcloudStorage::new(FakeFactory::new(Script::default()));
        let uploader = TestUploader::new("AKID-A", HOST, "uploads");

        assert!(storage.handle(&uploader, "../secret.png").is_err());
        let err = storage
            .store(&uploader, photo(), "../secret.png")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "InvalidKey");
        assert!(storage.factory.calls().is_empty());
    }

    #[test]
    fn test_bind_rejects_malformed_credentials() {
        let factory = FakeFactory::new(Script::default());
        let mut creds = credentials("AKID-A", HOST);
        creds.app_id = "not-a-number".to_string();
        let err = bind(&factory, &creds).err().unwrap();
        assert_eq!(err.code(), "InvalidCredentials");
        assert_eq!(factory.connects(), 0);
    }

    #[tokio::test]
    async fn test_store_success_on_200() {
        let storage = QcloudStorage::new(FakeFactory::new(Script::default()));
        let uploader = TestUploader::new("AKID-A", HOST, "uploads/1");

        let stored = storage.store(&uploader, photo(), "photo.png").await.unwrap();
        assert!(stored.outcome.success);
        assert_eq!(stored.file.path(), "/uploads/1/photo.png");
        assert_eq!(
            stored.file.url(),
            "https://bucket.example.com/uploads/1/photo.png"
        );
    }

    #[tokio::test]
    async fn test_store_failure_is_reported_not_raised() {
        for status in [StatusCode::NOT_FOUND, StatusCode::INTERNAL_SERVER_ERROR] {
            let script = Script {
                put: status,
                ..Script::default()
            };
            let storage = QcloudStorage::new(FakeFactory::new(script));
            let uploader = TestUploader::new("AKID-A", HOST, "uploads");
            let stored = storage.store(&uploader, photo(), "photo.png").await.unwrap();
            assert!(!stored.outcome.success);
            assert_eq!(stored.outcome.status, status);
        }
    }

    #[tokio::test]
    async fn test_store_applies_uploader_content_type() {
        let factory = FakeFactory::new(Script::default());
        let storage = QcloudStorage::new(factory);
        let mut uploader = TestUploader::new("AKID-A", HOST, "uploads");
        uploader.credentials.content_type = Some("application/x-forced".to_string());

        storage.store(&uploader, photo(), "photo.png").await.unwrap();
        match &storage.factory.calls()[0] {
            Call::Put { content_type, .. } => assert_eq!(content_type, "application/x-forced"),
            other => panic!("unexpected call {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_store_with_bad_credentials_makes_no_call() {
        let storage = QcloudStorage::new(FakeFactory::new(Script::default()));
        let mut uploader = TestUploader::new("AKID-A", HOST, "uploads");
        uploader.credentials.secret_key = String::new();

        let err = storage.store(&uploader, photo(), "photo.png").await.unwrap_err();
        assert_eq!(err.code(), "InvalidCredentials");
        assert!(storage.factory.calls().is_empty());
    }

    #[tokio::test]
    async fn test_retrieve_returns_cached_file_without_remote_call() {
        let storage = QcloudStorage::new(FakeFactory::new(Script::default()));
        let mut uploader = TestUploader::new("AKID-A", HOST, "uploads");
        let stored = storage.store(&uploader, photo(), "photo.png").await.unwrap();
        uploader.cached = Some(stored.file);

        let before = storage.factory.calls().len();
        let retrieved = storage.retrieve(&uploader, "photo.png").await.unwrap();
        assert_eq!(storage.factory.calls().len(), before);
        assert!(retrieved.stat.is_none());
        assert_eq!(retrieved.file.path(), "/uploads/photo.png");
        assert!(retrieved.file.file().is_some());
    }

    #[tokio::test]
    async fn test_retrieve_without_cache_stats_remote_object() {
        let storage = QcloudStorage::new(FakeFactory::new(Script::default()));
        let uploader = TestUploader::new("AKID-A", HOST, "uploads");

        let retrieved = storage.retrieve(&uploader, "photo.png").await.unwrap();
        assert_eq!(retrieved.file.path(), "/uploads/photo.png");
        assert!(matches!(retrieved.stat, Some(StatResult::Found(_))));
        assert_eq!(
            storage.factory.calls(),
            vec![Call::Head {
                secret_id: "AKID-A".to_string(),
                key: "/uploads/photo.png".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_retrieve_missing_object() {
        let script = Script {
            head: StatusCode::NOT_FOUND,
            ..Script::default()
        };
        let storage = QcloudStorage::new(FakeFactory::new(script));
        let uploader = TestUploader::new("AKID-A", HOST, "uploads");
        let retrieved = storage.retrieve(&uploader, "gone.png").await.unwrap();
        assert_eq!(retrieved.stat, Some(StatResult::Missing));
    }

    #[tokio::test]
    async fn test_handle_delete_and_url() {
        let storage = QcloudStorage::new(FakeFactory::new(Script::default()));
        let uploader = TestUploader::new("AKID-A", HOST, "uploads/1");
        let handle = storage.handle(&uploader, "photo.png").unwrap();
        assert_eq!(handle.url(), "https://bucket.example.com/uploads/1/photo.png");
        assert!(handle.delete().await.unwrap().success);
    }

    #[tokio::test]
    async fn test_concurrent_stores_keep_their_own_credentials() {
        // Upload A stalls inside the client while upload B binds different
        // credentials; A must still finish under its own.
        let script = Script {
            put_delay: Duration::from_millis(50),
            ..Script::default()
        };
        let storage = QcloudStorage::new(FakeFactory::new(script));
        let a = TestUploader::new("AKID-A", "https://a.example.com", "a");
        let b = TestUploader::new("AKID-B", "https://b.example.com", "b");

        let (stored_a, stored_b) = tokio::join!(
            storage.store(&a, photo(), "photo.png"),
            storage.store(&b, photo(), "photo.png"),
        );
        let stored_a = stored_a.unwrap();
        let stored_b = stored_b.unwrap();

        assert_eq!(stored_a.file.url(), "https://a.example.com/a/photo.png");
        assert_eq!(stored_b.file.url(), "https://b.example.com/b/photo.png");

        let calls = storage.factory.calls();
        assert_eq!(calls.len(), 2);
        for call in calls {
            match call {
                Call::Put { secret_id, key, .. } => match key.as_str() {
                    "/a/photo.png" => assert_eq!(secret_id, "AKID-A"),
                    "/b/photo.png" => assert_eq!(secret_id, "AKID-B"),
                    other => panic!("unexpected key {other}"),
                },
                other => panic!("unexpected call {other:?}"),
            }
        }
        assert_eq!(storage.factory.connects(), 2);
    }
}
