//! Tencent Cloud COS client over the XML API.
//!
//! Talks to a single bucket endpoint using `reqwest`, signing every
//! request with the COS v5 HMAC-SHA1 scheme.
//!
//! Signing:
//!   SignKey      = hex(HMAC-SHA1(SecretKey, KeyTime))
//!   HttpString   = "{method}\n{path}\n{params}\n{headers}\n"
//!   StringToSign = "sha1\n{SignTime}\n{hex(SHA1(HttpString))}\n"
//!   Signature    = hex(HMAC-SHA1(SignKey, StringToSign))
//!
//! Every [`CosClient`] owns its own [`Credentials`].  The
//! [`CosClientFactory`] shares only the connection pool between them.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use bytes::Bytes;
use hmac::{Hmac, Mac};
use md5::Md5;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE, DATE, HOST};
use reqwest::Method;
use sha1::{Digest, Sha1};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

use super::client::{ClientFactory, ClientFuture, ClientResponse, ObjectClient};
use super::credentials::Credentials;
use crate::config::ClientConfig;
use crate::errors::{generate_request_id, StorageError, StorageResult};

type HmacSha1 = Hmac<Sha1>;

/// Characters left unescaped in signed values and key segments.
const COS_UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Clock skew allowance applied to the start of the signature window.
const SIGN_START_SKEW_SECS: u64 = 60;

/// COS client bound to one bucket and one set of credentials.
pub struct CosClient {
    /// Shared HTTP client (connection pool).
    http: reqwest::Client,
    /// Credentials used for every request from this client.
    credentials: Credentials,
    /// Host header value derived from the bucket endpoint.
    host_header: String,
    /// Signature validity window.
    sign_expires: Duration,
}

impl CosClient {
    /// Create a client for `credentials`, validating them first.
    pub fn new(
        http: reqwest::Client,
        credentials: Credentials,
        sign_expires: Duration,
    ) -> StorageResult<Self> {
        credentials.check()?;
        let host_header = host_header(credentials.host()).to_string();
        Ok(Self {
            http,
            credentials,
            host_header,
            sign_expires,
        })
    }

    /// Full request URL for an object path.
    fn object_url(&self, key: &str) -> String {
        format!("{}{}", self.credentials.host(), encode_key(key))
    }

    /// Issue a signed request and collect the response.
    async fn send(
        &self,
        operation: &'static str,
        method: Method,
        key: &str,
        body: Option<(Bytes, &str)>,
    ) -> StorageResult<ClientResponse> {
        let request_id = generate_request_id();
        let url = self.object_url(key);

        let mut signed_headers: Vec<(String, String)> =
            vec![("host".to_string(), self.host_header.clone())];
        if let Some((_, content_type)) = body.as_ref() {
            signed_headers.push(("content-type".to_string(), (*content_type).to_string()));
        }

        let start = unix_now().saturating_sub(SIGN_START_SKEW_SECS);
        let authorization = sign_request(
            &self.credentials,
            method.as_str(),
            key,
            &[],
            &signed_headers,
            start,
            start + self.sign_expires.as_secs(),
        );

        debug!(
            request_id = %request_id,
            operation,
            method = %method,
            url = %url,
            "COS request"
        );

        let mut request = self
            .http
            .request(method, &url)
            .header(HOST, &self.host_header)
            .header(DATE, httpdate::fmt_http_date(SystemTime::now()))
            .header(
                AUTHORIZATION,
                HeaderValue::from_str(&authorization)
                    .map_err(|e| anyhow::anyhow!("Invalid authorization header: {e}"))?,
            );

        if let Some((content, content_type)) = body {
            request = request
                .header(CONTENT_TYPE, content_type)
                .header("content-md5", content_md5(&content))
                .body(content);
        }

        let response = request
            .send()
            .await
            .map_err(|source| StorageError::Transport { operation, source })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|source| StorageError::Transport { operation, source })?;

        debug!(
            request_id = %request_id,
            operation,
            status = status.as_u16(),
            "COS response"
        );

        Ok(ClientResponse {
            status,
            headers,
            body,
        })
    }
}

impl ObjectClient for CosClient {
    fn put<'a>(&'a self, key: &'a str, content: Bytes, content_type: &'a str) -> ClientFuture<'a> {
        Box::pin(self.send("put", Method::PUT, key, Some((content, content_type))))
    }

    fn delete<'a>(&'a self, key: &'a str) -> ClientFuture<'a> {
        Box::pin(self.send("delete", Method::DELETE, key, None))
    }

    fn head<'a>(&'a self, key: &'a str) -> ClientFuture<'a> {
        Box::pin(self.send("head", Method::HEAD, key, None))
    }

    fn host(&self) -> &str {
        self.credentials.host()
    }
}

/// Builds [`CosClient`]s that share one connection pool.
#[derive(Clone)]
pub struct CosClientFactory {
    http: reqwest::Client,
    sign_expires: Duration,
}

impl CosClientFactory {
    /// Build the shared HTTP client from transport settings.
    pub fn new(config: &ClientConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {e}"))?;
        Ok(Self {
            http,
            sign_expires: Duration::from_secs(config.sign_expires_secs),
        })
    }
}

impl ClientFactory for CosClientFactory {
    fn connect(&self, credentials: &Credentials) -> StorageResult<Arc<dyn ObjectClient>> {
        let client = CosClient::new(self.http.clone(), credentials.clone(), self.sign_expires)?;
        Ok(Arc::new(client))
    }
}

// -- Signing -------------------------------------------------------------------

/// Build the COS `Authorization` header value.
///
/// `params` and `headers` are `(name, value)` pairs to sign.  The engine
/// itself never sends query parameters, so its requests pass `&[]`.
pub fn sign_request(
    credentials: &Credentials,
    method: &str,
    key: &str,
    params: &[(String, String)],
    headers: &[(String, String)],
    start: u64,
    end: u64,
) -> String {
    let sign_time = format!("{start};{end}");
    let (param_list, param_string) = canonicalize(params);
    let (header_list, header_string) = canonicalize(headers);

    let http_string = format!(
        "{}\n{}\n{}\n{}\n",
        method.to_lowercase(),
        key,
        param_string,
        header_string
    );
    let string_to_sign = format!("sha1\n{}\n{}\n", sign_time, sha1_hex(http_string.as_bytes()));

    let sign_key = hmac_sha1_hex(credentials.secret_key.as_bytes(), sign_time.as_bytes());
    let signature = hmac_sha1_hex(sign_key.as_bytes(), string_to_sign.as_bytes());

    format!(
        "q-sign-algorithm=sha1&q-ak={}&q-sign-time={sign_time}&q-key-time={sign_time}&q-header-list={header_list}&q-url-param-list={param_list}&q-signature={signature}",
        credentials.secret_id
    )
}

/// Lowercase, encode and sort pairs into `(key list, key=value string)`.
fn canonicalize(pairs: &[(String, String)]) -> (String, String) {
    let mut canonical: Vec<(String, String)> = pairs
        .iter()
        .map(|(k, v)| (cos_encode(&k.to_lowercase()), cos_encode(v)))
        .collect();
    canonical.sort();

    let list = canonical
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");
    let string = canonical
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    (list, string)
}

fn hmac_sha1_hex(key: &[u8], data: &[u8]) -> String {
    let mut mac = HmacSha1::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    hex::encode(mac.finalize().into_bytes())
}

fn sha1_hex(data: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Base64 MD5 digest for the `Content-MD5` header.
fn content_md5(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    BASE64_STANDARD.encode(hasher.finalize())
}

fn cos_encode(value: &str) -> String {
    utf8_percent_encode(value, COS_UNRESERVED).to_string()
}

/// Percent-encode each `/`-separated segment of an object key.
fn encode_key(key: &str) -> String {
    key.split('/').map(cos_encode).collect::<Vec<_>>().join("/")
}

/// Strip the scheme from a bucket endpoint.
fn host_header(host: &str) -> &str {
    host.split_once("://").map_or(host, |(_, rest)| rest)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
