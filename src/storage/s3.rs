//! S3 upload backend built on `object_store`.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::{ClientOptions, ObjectStore, ObjectStoreExt, path::Path as ObjectPath};
use tracing::{debug, info};

use super::{Destination, UploadError, Uploader};
use crate::config::StorageConfig;

/// Uploads objects to a single S3 bucket.
pub struct S3Uploader {
    inner: Arc<dyn ObjectStore>,
}

impl S3Uploader {
    pub fn new(inner: Arc<dyn ObjectStore>) -> Self {
        Self { inner }
    }

    /// Build an uploader from the storage settings.
    pub fn from_config(config: &StorageConfig) -> Result<Self, UploadError> {
        // The site loads the prompt as a script, so serve `.js` objects as such.
        let client_options =
            ClientOptions::new().with_content_type_for_suffix("js", "application/javascript");

        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(&config.bucket)
            .with_region(&config.region)
            .with_client_options(client_options);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.with_endpoint(endpoint);
        }
        if let Some(key) = &config.access_key {
            builder = builder.with_access_key_id(key);
        }
        if let Some(secret) = &config.secret_key {
            builder = builder.with_secret_access_key(secret);
        }

        let store = builder.build()?;
        info!("S3 uploader ready (bucket: {}, region: {})", config.bucket, config.region);
        Ok(Self::new(Arc::new(store)))
    }
}

#[async_trait]
impl Uploader for S3Uploader {
    async fn upload(&self, payload: Bytes, destination: &Destination) -> Result<(), UploadError> {
        let path = ObjectPath::from(destination.key.as_str());
        debug!("Uploading {} bytes to {}", payload.len(), path);

        self.inner.put(&path, payload.into()).await?;
        Ok(())
    }
}
