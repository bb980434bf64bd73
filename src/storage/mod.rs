//! Tencent Cloud COS storage engine.
//!
//! The [`engine::StorageEngine`] trait is the hook contract an upload
//! library drives.  [`engine::QcloudStorage`] implements it over any
//! [`client::ClientFactory`]; [`cos::CosClientFactory`] is the real one.

pub mod client;
pub mod cos;
pub mod credentials;
pub mod engine;
pub mod file;

#[cfg(test)]
pub(crate) mod testing;
