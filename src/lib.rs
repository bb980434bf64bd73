//! qcloud-upload library: Tencent Cloud COS storage engine for uploads.
//!
//! This crate plugs a COS bucket into a generic upload flow: it binds a
//! signed client to the uploader's credentials, derives object keys from
//! the uploader's path template, and forwards store, stat, and delete
//! calls to the bucket.

pub mod config;
pub mod errors;
pub mod metrics;
pub mod storage;
pub mod uploader;

pub use errors::{Outcome, StorageError, StorageResult};
pub use storage::engine::{QcloudStorage, StorageEngine};
pub use uploader::{ConfiguredUploader, Uploader};
