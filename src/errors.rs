//! Error and outcome types for COS storage operations.
//!
//! Two failure classes are kept apart.  A request that never produced an
//! HTTP status (DNS, TLS, timeout, bad credentials, unsupported operation)
//! is a [`StorageError`].  A request that reached COS and came back with
//! an unexpected status is an [`Outcome`] with `success == false`, so
//! callers can branch on the status and the parsed COS error code.

use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;

/// Generate a 16-character hex request ID for log correlation.
pub fn generate_request_id() -> String {
    let bytes: [u8; 8] = rand::random();
    hex::encode(bytes).to_uppercase()
}

/// Errors raised before or instead of a COS response.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The request did not complete (connect, TLS, timeout, body read).
    #[error("transport failure during {operation}: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// Credentials were rejected before any request was made.
    #[error("invalid credentials: {message}")]
    InvalidCredentials { message: String },

    /// The file identifier is empty.
    #[error("file identifier must not be empty")]
    InvalidIdentifier,

    /// The uploader's path template produced an unusable key.
    #[error("invalid object key {key:?}: {message}")]
    InvalidKey { key: String, message: String },

    /// A handle was asked to store without any local content attached.
    #[error("no local file attached to handle for {path}")]
    MissingContent { path: String },

    /// The operation is not supported by this storage engine.
    #[error("operation not supported: {operation}")]
    Unsupported { operation: &'static str },

    /// Reading the local file failed.
    #[error("local file error: {0}")]
    Io(#[from] std::io::Error),

    /// Catch-all for unexpected internal errors.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl StorageError {
    /// Short machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            StorageError::Transport { .. } => "Transport",
            StorageError::InvalidCredentials { .. } => "InvalidCredentials",
            StorageError::InvalidIdentifier => "InvalidIdentifier",
            StorageError::InvalidKey { .. } => "InvalidKey",
            StorageError::MissingContent { .. } => "MissingContent",
            StorageError::Unsupported { .. } => "Unsupported",
            StorageError::Io(_) => "Io",
            StorageError::Internal(_) => "InternalError",
        }
    }

    /// Whether repeating the same call could succeed.
    ///
    /// Only transport failures are transient.  Every other variant is a
    /// property of the inputs and will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Transport { .. })
    }
}

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Parsed COS `<Error>` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cause {
    /// COS error code, e.g. `NoSuchKey`, `AccessDenied`.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// COS request ID, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Result of a remote call that reached COS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    /// Whether the status matched the operation's success status.
    pub success: bool,
    /// HTTP status returned by COS.
    #[serde(serialize_with = "serialize_status")]
    pub status: StatusCode,
    /// Parsed error details for unsuccessful calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<Cause>,
}

impl Outcome {
    /// Build an outcome by comparing `status` against `expected`.
    pub fn from_status(status: StatusCode, expected: StatusCode, body: &[u8]) -> Self {
        if status == expected {
            return Self {
                success: true,
                status,
                cause: None,
            };
        }
        Self {
            success: false,
            status,
            cause: Some(parse_error_body(status, body)),
        }
    }

    /// Whether a failed call is worth retrying (throttling or server error).
    pub fn is_retryable(&self) -> bool {
        !self.success
            && (self.status.is_server_error() || self.status == StatusCode::TOO_MANY_REQUESTS)
    }
}

fn serialize_status<S: serde::Serializer>(status: &StatusCode, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u16(status.as_u16())
}

/// Parse a COS XML error document.
///
/// ```xml
/// <?xml version="1.0" encoding="UTF-8"?>
/// <Error>
///   <Code>NoSuchKey</Code>
///   <Message>The specified key does not exist.</Message>
///   <RequestId>NjQ2...</RequestId>
/// </Error>
/// ```
///
/// Bodies that are empty or not XML fall back to the status reason.
pub fn parse_error_body(status: StatusCode, body: &[u8]) -> Cause {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_reader(body);
    reader.trim_text(true);

    let mut code = None;
    let mut message = None;
    let mut request_id = None;
    let mut current_tag = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                current_tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
            }
            Ok(Event::Text(ref e)) => {
                let Ok(text) = e.unescape() else { break };
                let text = text.to_string();
                match current_tag.as_str() {
                    "Code" => code = Some(text),
                    "Message" => message = Some(text),
                    "RequestId" => request_id = Some(text),
                    _ => {}
                }
            }
            Ok(Event::End(_)) => current_tag.clear(),
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    let reason = status.canonical_reason().unwrap_or("Unknown");
    Cause {
        code: code.unwrap_or_else(|| format!("Http{}", status.as_u16())),
        message: message.unwrap_or_else(|| reason.to_string()),
        request_id,
    }
}
