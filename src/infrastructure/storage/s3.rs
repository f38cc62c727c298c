use anyhow::{anyhow, Result};
use async_trait::async_trait;
use aws_sdk_s3::config::Builder;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::{Client, config::BehaviorVersion, config::Credentials, config::Region};
use bytes::Bytes;
use std::time::Duration;
use tracing::{debug, info};

use super::{BLOB_NAME_LEN, BlobStore};
use crate::common::token::random_token;

#[derive(Clone)]
pub struct StorageService {
    pub client: Client,
    pub bucket: String,
}

impl StorageService {
    pub fn new(
        endpoint: &str,
        region: &str,
        bucket: &str,
        access_key: &str,
        secret_key: &str,
    ) -> Self {
        let credentials = Credentials::new(access_key, secret_key, None, None, "static");

        let config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .endpoint_url(endpoint)
            .credentials_provider(credentials)
            .force_path_style(true) // Required for MinIO
            .build();

        let client = Client::from_conf(config);

        info!("S3 client configured for bucket {}", bucket);

        Self {
            client,
            bucket: bucket.to_string(),
        }
    }

    /// Creates the bucket if it does not exist yet.
    pub async fn ensure_bucket(&self) -> Result<()> {
        if self.client.head_bucket().bucket(&self.bucket).send().await.is_ok() {
            return Ok(());
        }

        info!("Creating bucket {}", self.bucket);
        self.client
            .create_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to create bucket {}: {}", self.bucket, e))?;
        Ok(())
    }

    pub async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> Result<()> {
        debug!(key, size = body.len(), "Uploading object");
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to upload {}: {}", key, e))?;
        Ok(())
    }

    pub async fn presign_get(&self, key: &str, expires_in: Duration) -> Result<String> {
        let presign_config = PresigningConfig::expires_in(expires_in)
            .map_err(|e| anyhow!("Invalid presign expiry: {}", e))?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presign_config)
            .await
            .map_err(|e| anyhow!("Failed to presign {}: {}", key, e))?;

        Ok(presigned.uri().to_string())
    }
}

#[async_trait]
impl BlobStore for StorageService {
    async fn put(&self, data: Bytes, content_type: &str) -> Result<String> {
        let name = random_token(BLOB_NAME_LEN);
        self.put_object(&name, data, content_type).await?;
        Ok(name)
    }

    async fn signed_url(&self, name: &str, ttl: Duration) -> Result<String> {
        self.presign_get(name, ttl).await
    }
}
