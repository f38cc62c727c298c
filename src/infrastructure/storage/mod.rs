use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

pub mod s3;

/// Length of the random object names handed out by [`BlobStore::put`].
pub const BLOB_NAME_LEN: usize = 32;

/// Private content storage. Objects are only reachable through signed URLs.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `data` under a fresh random name and returns that name.
    async fn put(&self, data: Bytes, content_type: &str) -> Result<String>;

    /// Issues a read-only URL for `name` valid for `ttl`.
    async fn signed_url(&self, name: &str, ttl: Duration) -> Result<String>;
}
