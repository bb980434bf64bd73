//! In-process fakes for exercising the engine without a network.

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, ETAG, LAST_MODIFIED};
use reqwest::StatusCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::client::{ClientFactory, ClientFuture, ClientResponse, ObjectClient};
use super::credentials::Credentials;
use crate::errors::StorageResult;

/// One recorded client call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Put {
        secret_id: String,
        key: String,
        content: Bytes,
        content_type: String,
    },
    Delete {
        secret_id: String,
        key: String,
    },
    Head {
        secret_id: String,
        key: String,
    },
}

/// Canned statuses returned by [`FakeClient`].
#[derive(Debug, Clone)]
pub struct Script {
    pub put: StatusCode,
    pub delete: StatusCode,
    pub head: StatusCode,
    pub error_body: Bytes,
    pub put_delay: Duration,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            put: StatusCode::OK,
            delete: StatusCode::NO_CONTENT,
            head: StatusCode::OK,
            error_body: Bytes::new(),
            put_delay: Duration::ZERO,
        }
    }
}

/// Fake client that records calls into a shared log.
pub struct FakeClient {
    credentials: Credentials,
    script: Script,
    log: Arc<Mutex<Vec<Call>>>,
}

impl FakeClient {
    pub fn new(credentials: Credentials, script: Script) -> Self {
        Self {
            credentials,
            script,
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.log.lock().unwrap().clone()
    }

    fn respond(&self, status: StatusCode) -> ClientResponse {
        let mut response = ClientResponse::status(status);
        if !status.is_success() {
            response.body = self.script.error_body.clone();
        }
        response
    }
}

impl ObjectClient for FakeClient {
    fn put<'a>(&'a self, key: &'a str, content: Bytes, content_type: &'a str) -> ClientFuture<'a> {
        Box::pin(async move {
            self.log.lock().unwrap().push(Call::Put {
                secret_id: self.credentials.secret_id.clone(),
                key: key.to_string(),
                content,
                content_type: content_type.to_string(),
            });
            if !self.script.put_delay.is_zero() {
                tokio::time::sleep(self.script.put_delay).await;
            }
            Ok(self.respond(self.script.put))
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> ClientFuture<'a> {
        Box::pin(async move {
            self.log.lock().unwrap().push(Call::Delete {
                secret_id: self.credentials.secret_id.clone(),
                key: key.to_string(),
            });
            Ok(self.respond(self.script.delete))
        })
    }

    fn head<'a>(&'a self, key: &'a str) -> ClientFuture<'a> {
        Box::pin(async move {
            self.log.lock().unwrap().push(Call::Head {
                secret_id: self.credentials.secret_id.clone(),
                key: key.to_string(),
            });
            let mut response = ClientResponse::status(self.script.head);
            if self.script.head == StatusCode::OK {
                let mut headers = HeaderMap::new();
                headers.insert(CONTENT_LENGTH, HeaderValue::from_static("11"));
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("image/png"));
                headers.insert(ETAG, HeaderValue::from_static("\"5eb63bbbe01eeed093cb22bb8f5acdc3\""));
                headers.insert(
                    LAST_MODIFIED,
                    HeaderValue::from_static("Tue, 14 Nov 2023 22:13:20 GMT"),
                );
                response.headers = headers;
            }
            Ok(response)
        })
    }

    fn host(&self) -> &str {
        self.credentials.host()
    }
}

/// Fake factory: every `connect` builds a fresh [`FakeClient`] sharing
/// one call log, so tests can see which credentials each call used.
pub struct FakeFactory {
    script: Script,
    log: Arc<Mutex<Vec<Call>>>,
    connects: AtomicUsize,
}

impl FakeFactory {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            log: Arc::new(Mutex::new(Vec::new())),
            connects: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.log.lock().unwrap().clone()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl ClientFactory for FakeFactory {
    fn connect(&self, credentials: &Credentials) -> StorageResult<Arc<dyn ObjectClient>> {
        credentials.check()?;
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeClient {
            credentials: credentials.clone(),
            script: self.script.clone(),
            log: Arc::clone(&self.log),
        }))
    }
}

/// Credentials that pass validation, distinguished by `secret_id`.
pub fn credentials(secret_id: &str, host: &str) -> Credentials {
    Credentials {
        app_id: "1250000000".to_string(),
        secret_id: secret_id.to_string(),
        secret_key: format!("{secret_id}-key"),
        bucket_host: host.to_string(),
        content_type: None,
    }
}
