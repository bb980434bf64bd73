//! Local upload files and remote object handles.
//!
//! A [`LocalFile`] is the content an uploader hands to the engine.  A
//! [`RemoteFile`] is an in-memory reference to an object in the bucket:
//! its key plus the client bound to the credentials it was created with.
//! It never caches bytes or existence; every method is one round-trip.

use bytes::Bytes;
use reqwest::header::{HeaderName, CONTENT_LENGTH, CONTENT_TYPE, ETAG, LAST_MODIFIED};
use reqwest::StatusCode;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use super::client::ObjectClient;
use crate::errors::{Outcome, StorageError, StorageResult};
use crate::metrics;

/// Fallback MIME type for unknown extensions.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// File content supplied for upload.
#[derive(Debug, Clone)]
pub struct LocalFile {
    filename: String,
    content: Bytes,
    content_type: Option<String>,
    path: Option<PathBuf>,
}

impl LocalFile {
    /// Read a file from disk.
    pub async fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(Self {
            filename,
            content: Bytes::from(content),
            content_type: None,
            path: Some(path.to_path_buf()),
        })
    }

    /// Wrap in-memory content.
    pub fn from_bytes(filename: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
            content_type: None,
            path: None,
        }
    }

    /// Set an explicit content type instead of inferring one.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn content(&self) -> &Bytes {
        &self.content
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Source path on disk, if the file was opened from one.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Explicit content type, or one guessed from the file extension.
    pub fn content_type(&self) -> &str {
        self.content_type
            .as_deref()
            .unwrap_or_else(|| guess_content_type(&self.filename))
    }
}

/// Map common upload extensions to MIME types.
pub fn guess_content_type(filename: &str) -> &'static str {
    let ext = match filename.rsplit_once('.') {
        Some((_, ext)) => ext.to_ascii_lowercase(),
        None => return DEFAULT_CONTENT_TYPE,
    };
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        "json" => "application/json",
        "txt" => "text/plain",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" => "application/javascript",
        "mp4" => "video/mp4",
        "mp3" => "audio/mpeg",
        "zip" => "application/zip",
        _ => DEFAULT_CONTENT_TYPE,
    }
}

/// Object metadata returned by a successful `stat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectMeta {
    pub size: Option<u64>,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

/// Answer to a metadata lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StatResult {
    /// The object exists.
    Found(ObjectMeta),
    /// COS answered 404.
    Missing,
    /// COS answered with any other status.
    Rejected(Outcome),
}

/// Handle to an object in the bucket.
#[derive(Clone)]
pub struct RemoteFile {
    path: String,
    file: Option<LocalFile>,
    content_type: Option<String>,
    client: Arc<dyn ObjectClient>,
}

impl std::fmt::Debug for RemoteFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteFile")
            .field("path", &self.path)
            .field("file", &self.file.as_ref().map(LocalFile::filename))
            .field("host", &self.client.host())
            .finish()
    }
}

impl RemoteFile {
    /// Create a handle for `path`, optionally carrying local content.
    pub fn new(client: Arc<dyn ObjectClient>, path: String, file: Option<LocalFile>) -> Self {
        Self {
            path,
            file,
            content_type: None,
            client,
        }
    }

    /// Override the content type sent on `store`.
    pub fn with_content_type(mut self, content_type: Option<String>) -> Self {
        self.content_type = content_type;
        self
    }

    /// Object key within the bucket.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Local content attached to this handle.
    pub fn file(&self) -> Option<&LocalFile> {
        self.file.as_ref()
    }

    /// Public URL: bucket host followed by the object path.
    ///
    /// Pure string concatenation.  The object may not exist and the URL
    /// is not signed.
    pub fn url(&self) -> String {
        format!("{}{}", self.client.host(), self.path)
    }

    /// Upload the attached local content.  Success iff COS answers 200.
    pub async fn store(&self) -> StorageResult<Outcome> {
        let file = self.file.as_ref().ok_or_else(|| StorageError::MissingContent {
            path: self.path.clone(),
        })?;
        let content_type = self
            .content_type
            .as_deref()
            .unwrap_or_else(|| file.content_type());

        let started = Instant::now();
        let response = self
            .client
            .put(&self.path, file.content().clone(), content_type)
            .await
            .inspect_err(|_| metrics::record_operation("put", "error", started.elapsed()))?;
        let outcome = Outcome::from_status(response.status, StatusCode::OK, &response.body);
        metrics::record_operation("put", metrics::outcome_label(outcome.success), started.elapsed());

        if outcome.success {
            metrics::record_upload_bytes(file.len());
            info!(path = %self.path, bytes = file.len(), "stored object");
        } else {
            warn!(path = %self.path, status = outcome.status.as_u16(), cause = ?outcome.cause, "store rejected");
        }
        Ok(outcome)
    }

    /// Look up object metadata with a HEAD request.
    pub async fn stat(&self) -> StorageResult<StatResult> {
        let started = Instant::now();
        let response = self
            .client
            .head(&self.path)
            .await
            .inspect_err(|_| metrics::record_operation("head", "error", started.elapsed()))?;

        let result = match response.status {
            StatusCode::OK => {
                let header = |name: HeaderName| {
                    response
                        .headers
                        .get(name)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string)
                };
                StatResult::Found(ObjectMeta {
                    size: header(CONTENT_LENGTH).and_then(|v| v.parse().ok()),
                    content_type: header(CONTENT_TYPE),
                    etag: header(ETAG),
                    last_modified: header(LAST_MODIFIED),
                })
            }
            StatusCode::NOT_FOUND => StatResult::Missing,
            status => StatResult::Rejected(Outcome::from_status(
                status,
                StatusCode::OK,
                &response.body,
            )),
        };
        let label = metrics::outcome_label(!matches!(result, StatResult::Rejected(_)));
        metrics::record_operation("head", label, started.elapsed());
        Ok(result)
    }

    /// Delete the object.  Success iff COS answers 204.
    ///
    /// Parent "directories" left empty are not removed; see
    /// [`RemoteFile::delete_empty_parent`].
    pub async fn delete(&self) -> StorageResult<Outcome> {
        let started = Instant::now();
        let response = self
            .client
            .delete(&self.path)
            .await
            .inspect_err(|_| metrics::record_operation("delete", "error", started.elapsed()))?;
        let outcome = Outcome::from_status(response.status, StatusCode::NO_CONTENT, &response.body);
        metrics::record_operation(
            "delete",
            metrics::outcome_label(outcome.success),
            started.elapsed(),
        );

        if outcome.success {
            info!(path = %self.path, "deleted object");
        } else {
            warn!(path = %self.path, status = outcome.status.as_u16(), cause = ?outcome.cause, "delete rejected");
        }
        Ok(outcome)
    }

    /// Download object content.  Not supported by this engine.
    pub async fn retrieve(&self) -> StorageResult<LocalFile> {
        Err(StorageError::Unsupported {
            operation: "retrieve",
        })
    }

    /// Remove the parent prefix once it holds no objects.  Not supported.
    pub async fn delete_empty_parent(&self) -> StorageResult<Outcome> {
        Err(StorageError::Unsupported {
            operation: "delete_empty_parent",
        })
    }
}
