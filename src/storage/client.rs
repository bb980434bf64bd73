//! Object client abstraction.
//!
//! [`ObjectClient`] is the minimal capability the storage engine needs
//! from a COS SDK: upload, delete, and metadata lookup keyed by object
//! path, each answering with the raw HTTP status.  [`ClientFactory`]
//! binds a client to one [`Credentials`] value per operation.

use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use super::credentials::Credentials;
use crate::errors::StorageResult;

/// Raw response from an object client call.
#[derive(Debug, Clone)]
pub struct ClientResponse {
    /// HTTP status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body (error XML on failure, empty otherwise).
    pub body: Bytes,
}

impl ClientResponse {
    /// A response with only a status, as produced by fakes.
    pub fn status(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }
}

/// Boxed future returned by [`ObjectClient`] methods.
pub type ClientFuture<'a> = Pin<Box<dyn Future<Output = StorageResult<ClientResponse>> + Send + 'a>>;

/// Async object storage capability bound to one bucket.
pub trait ObjectClient: Send + Sync + 'static {
    /// Upload `content` to `key`.
    fn put<'a>(&'a self, key: &'a str, content: Bytes, content_type: &'a str) -> ClientFuture<'a>;

    /// Delete the object at `key`.
    fn delete<'a>(&'a self, key: &'a str) -> ClientFuture<'a>;

    /// Fetch object metadata at `key` without the body.
    fn head<'a>(&'a self, key: &'a str) -> ClientFuture<'a>;

    /// Bucket host that object paths are appended to.
    fn host(&self) -> &str;
}

/// Produces a client bound to a specific set of credentials.
pub trait ClientFactory: Send + Sync + 'static {
    /// Validate `credentials` and return a client that uses only them.
    fn connect(&self, credentials: &Credentials) -> StorageResult<Arc<dyn ObjectClient>>;
}
