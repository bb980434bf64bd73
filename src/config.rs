//! Configuration loading and types for the COS upload engine.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct.  Each subsection governs a different part of the
//! system: bucket credentials, the uploader path template, the HTTP
//! transport, logging, and metrics.

use serde::Deserialize;
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Bucket credentials and host.
    pub qcloud: QcloudConfig,

    /// Uploader settings (object key template).
    #[serde(default)]
    pub uploader: UploaderConfig,

    /// HTTP transport settings.
    #[serde(default)]
    pub client: ClientConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Observability settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Tencent Cloud COS bucket configuration.
///
/// Field names match the uploader accessors: `qcloud.app_id`,
/// `qcloud.secret_id`, `qcloud.secret_key`, `qcloud.bucket_host`.
#[derive(Clone, Deserialize)]
pub struct QcloudConfig {
    /// Tencent Cloud AppID (numeric).
    #[serde(default)]
    pub app_id: String,

    /// API SecretId.
    #[serde(default)]
    pub secret_id: String,

    /// API SecretKey.
    #[serde(default)]
    pub secret_key: String,

    /// Bucket endpoint, e.g. `https://bucket-1250000000.cos.ap-guangzhou.myqcloud.com`.
    #[serde(alias = "host", default)]
    pub bucket_host: String,

    /// Fixed content type for every upload.  When unset the type is
    /// inferred from each file.
    #[serde(default)]
    pub content_type: Option<String>,
}

impl std::fmt::Debug for QcloudConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QcloudConfig")
            .field("app_id", &self.app_id)
            .field("secret_id", &self.secret_id)
            .field("secret_key", &"<redacted>")
            .field("bucket_host", &self.bucket_host)
            .field("content_type", &self.content_type)
            .finish()
    }
}

/// Uploader configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct UploaderConfig {
    /// Directory prefix under which objects are stored.
    #[serde(default = "default_store_dir")]
    pub store_dir: String,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            store_dir: default_store_dir(),
        }
    }
}

/// HTTP transport configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Whole-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Validity window of each request signature in seconds.
    #[serde(default = "default_sign_expires_secs")]
    pub sign_expires_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            sign_expires_secs: default_sign_expires_secs(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Record Prometheus metrics for every remote operation.
    #[serde(default = "default_true")]
    pub metrics: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { metrics: true }
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_store_dir() -> String {
    "uploads".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_sign_expires_secs() -> u64 {
    600
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Environment variables that override the `qcloud` section.
pub const ENV_APP_ID: &str = "QCLOUD_APP_ID";
pub const ENV_SECRET_ID: &str = "QCLOUD_SECRET_ID";
pub const ENV_SECRET_KEY: &str = "QCLOUD_SECRET_KEY";
pub const ENV_BUCKET_HOST: &str = "QCLOUD_BUCKET_HOST";

/// Parse configuration from a YAML string.
pub fn parse_config(contents: &str) -> anyhow::Result<Config> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
}

/// Load and parse configuration from a YAML file at `path`, then apply
/// `QCLOUD_*` environment overrides.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let mut config = parse_config(&contents)?;
    apply_overrides(&mut config, |name| std::env::var(name).ok());
    Ok(config)
}

/// Overlay credential values returned by `lookup` onto `config`.
///
/// Empty values are ignored so an exported-but-blank variable does not
/// wipe a configured secret.
pub fn apply_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let qcloud = &mut config.qcloud;
    let fields: [(&str, &mut String); 4] = [
        (ENV_APP_ID, &mut qcloud.app_id),
        (ENV_SECRET_ID, &mut qcloud.secret_id),
        (ENV_SECRET_KEY, &mut qcloud.secret_key),
        (ENV_BUCKET_HOST, &mut qcloud.bucket_host),
    ];
    for (name, slot) in fields {
        if let Some(value) = lookup(name).filter(|v| !v.is_empty()) {
            *slot = value;
        }
    }
}
