//! Upload backends for generated site configuration.
//!
//! The prompt handler only depends on the [`Uploader`] trait; [`S3Uploader`]
//! is the production backend.

mod s3;

pub use s3::S3Uploader;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("object store error: {0}")]
    Store(#[from] object_store::Error),

    #[error("upload failed: {0}")]
    Failed(String),
}

/// Where an upload should land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    /// Object key inside the configured bucket.
    pub key: String,
}

impl Destination {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

/// A latency-unbounded upload operation.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, payload: Bytes, destination: &Destination) -> Result<(), UploadError>;
}

/// Settings consumed by the hamagrams site.
#[derive(Debug, Clone, Serialize)]
pub struct HamagramConfig<'a> {
    pub prompt: &'a str,
}

impl HamagramConfig<'_> {
    /// Encode as the `config=...;` script the site loads.
    pub fn to_script(&self) -> Result<Bytes, UploadError> {
        let json = serde_json::to_string(self)?;
        Ok(Bytes::from(format!("config={};", json)))
    }
}
