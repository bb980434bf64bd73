//! Immutable per-call credential values.

use garde::Validate;

use crate::errors::{StorageError, StorageResult};

/// Everything needed to talk to one COS bucket.
///
/// A `Credentials` value is snapshotted from the uploader at the start of
/// each operation and handed to the client factory.  Nothing mutates it
/// afterwards, so concurrent uploads with different buckets never share
/// configuration.
#[derive(Clone, PartialEq, Eq, Validate)]
pub struct Credentials {
    /// Tencent Cloud AppID.
    #[garde(length(min = 1), pattern(r"^[0-9]+$"))]
    pub app_id: String,
    /// API SecretId (`q-ak` in signatures).
    #[garde(length(min = 1))]
    pub secret_id: String,
    /// API SecretKey.
    #[garde(length(min = 1))]
    pub secret_key: String,
    /// Bucket endpoint including scheme, no trailing path.
    #[garde(pattern(r"^https?://[^/\s]+/?$"))]
    pub bucket_host: String,
    /// Fixed content type for uploads, if configured.
    #[garde(skip)]
    pub content_type: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("app_id", &self.app_id)
            .field("secret_id", &self.secret_id)
            .field("secret_key", &"<redacted>")
            .field("bucket_host", &self.bucket_host)
            .field("content_type", &self.content_type)
            .finish()
    }
}

impl Credentials {
    /// Validate every field, mapping the report into a storage error.
    pub fn check(&self) -> StorageResult<()> {
        self.validate()
            .map_err(|report| StorageError::InvalidCredentials {
                message: report.to_string(),
            })
    }

    /// Bucket host without a trailing slash, ready for key concatenation.
    pub fn host(&self) -> &str {
        self.bucket_host.trim_end_matches('/')
    }
}
