#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use axum::body::Body;
use axum::response::Response;
use bytes::Bytes;
use http_body_util::BodyExt;
use time::OffsetDateTime;
use uuid::Uuid;

use media_relay::infrastructure::encoder::MediaEncoder;
use media_relay::infrastructure::queue::JobPublisher;
use media_relay::infrastructure::storage::BlobStore;
use media_relay::modules::download::events::DownloadJob;
use media_relay::modules::download::model::{
    DownloadRequest, DownloadStatus, NewDownloadRequest, ProcessedVideo,
};
use media_relay::modules::download::repository::{DownloadRepository, StatusUpdate};

// --- Record store ---

#[derive(Default)]
pub struct InMemoryDownloads {
    requests: Mutex<Vec<DownloadRequest>>,
    videos: Mutex<Vec<ProcessedVideo>>,
}

impl InMemoryDownloads {
    pub fn seed_request(&self, request: DownloadRequest) {
        self.requests.lock().unwrap().push(request);
    }

    pub fn seed_video(&self, video: ProcessedVideo) {
        self.videos.lock().unwrap().push(video);
    }

    pub fn request(&self, installation_id: Uuid, request_id: Uuid) -> Option<DownloadRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.installation_id == installation_id && r.request_id == request_id)
            .cloned()
    }

    pub fn requests(&self) -> Vec<DownloadRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn videos(&self) -> Vec<ProcessedVideo> {
        self.videos.lock().unwrap().clone()
    }

    /// Shifts every request of `installation_id` into the past.
    pub fn backdate_requests(&self, installation_id: Uuid, by: time::Duration) {
        for r in self.requests.lock().unwrap().iter_mut() {
            if r.installation_id == installation_id {
                r.timestamp -= by;
            }
        }
    }
}

#[async_trait]
impl DownloadRepository for InMemoryDownloads {
    async fn latest_request(&self, installation_id: Uuid) -> Result<Option<DownloadRequest>> {
        Ok(self
            .requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.installation_id == installation_id)
            .max_by_key(|r| r.timestamp)
            .cloned())
    }

    async fn insert_request(&self, request: NewDownloadRequest) -> Result<DownloadRequest> {
        let mut requests = self.requests.lock().unwrap();
        if requests.iter().any(|r| r.request_id == request.request_id) {
            bail!("duplicate request id {}", request.request_id);
        }
        let stored = DownloadRequest {
            installation_id: request.installation_id,
            request_id: request.request_id,
            blob_id: request.blob_id,
            ip_address: request.ip_address,
            status: request.status,
            timestamp: OffsetDateTime::now_utc(),
        };
        requests.push(stored.clone());
        Ok(stored)
    }

    async fn advance_status(
        &self,
        installation_id: Uuid,
        request_id: Uuid,
        status: DownloadStatus,
    ) -> Result<StatusUpdate> {
        let mut requests = self.requests.lock().unwrap();
        let Some(request) = requests
            .iter_mut()
            .find(|r| r.installation_id == installation_id && r.request_id == request_id)
        else {
            return Ok(StatusUpdate::Missing);
        };

        if !status.can_follow(request.status) {
            return Ok(StatusUpdate::Refused(request.status));
        }
        request.status = status;
        request.timestamp = OffsetDateTime::now_utc();
        Ok(StatusUpdate::Applied)
    }

    async fn find_request(
        &self,
        installation_id: Uuid,
        request_id: Uuid,
    ) -> Result<Option<DownloadRequest>> {
        Ok(self.request(installation_id, request_id))
    }

    async fn list_requests_since(
        &self,
        installation_id: Uuid,
        since: OffsetDateTime,
    ) -> Result<Vec<DownloadRequest>> {
        let mut found: Vec<DownloadRequest> = self
            .requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.installation_id == installation_id && r.timestamp >= since)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(found)
    }

    async fn latest_processed_video(
        &self,
        content_hash: &str,
        since: OffsetDateTime,
    ) -> Result<Option<ProcessedVideo>> {
        Ok(self
            .videos
            .lock()
            .unwrap()
            .iter()
            .filter(|v| v.content_hash == content_hash && v.timestamp >= since)
            .max_by_key(|v| v.timestamp)
            .cloned())
    }

    async fn insert_processed_video(
        &self,
        content_hash: &str,
        blob_id: &str,
        signed_url: &str,
    ) -> Result<ProcessedVideo> {
        let mut videos = self.videos.lock().unwrap();
        videos.retain(|v| !(v.content_hash == content_hash && v.blob_id == blob_id));
        let video = ProcessedVideo {
            content_hash: content_hash.to_string(),
            blob_id: blob_id.to_string(),
            signed_url: signed_url.to_string(),
            timestamp: OffsetDateTime::now_utc(),
        };
        videos.push(video.clone());
        Ok(video)
    }

    async fn find_processed_video(&self, blob_id: &str) -> Result<Option<ProcessedVideo>> {
        Ok(self
            .videos
            .lock()
            .unwrap()
            .iter()
            .filter(|v| v.blob_id == blob_id)
            .max_by_key(|v| v.timestamp)
            .cloned())
    }
}

// --- Queue ---

#[derive(Default)]
pub struct RecordingPublisher {
    jobs: Mutex<Vec<DownloadJob>>,
    pub fail: bool,
}

impl RecordingPublisher {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn jobs(&self) -> Vec<DownloadJob> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobPublisher for RecordingPublisher {
    async fn publish_job(&self, job: &DownloadJob) -> Result<()> {
        if self.fail {
            bail!("broker unavailable");
        }
        self.jobs.lock().unwrap().push(job.clone());
        Ok(())
    }
}

// --- Blob storage ---

#[derive(Default)]
pub struct InMemoryBlobStore {
    objects: Mutex<HashMap<String, Bytes>>,
    counter: AtomicUsize,
    pub fail_put: bool,
}

impl InMemoryBlobStore {
    pub fn failing() -> Self {
        Self {
            fail_put: true,
            ..Self::default()
        }
    }

    pub fn objects(&self) -> HashMap<String, Bytes> {
        self.objects.lock().unwrap().clone()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(&self, data: Bytes, _content_type: &str) -> Result<String> {
        if self.fail_put {
            bail!("bucket unavailable");
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let name = format!("{:032}", n);
        self.objects.lock().unwrap().insert(name.clone(), data);
        Ok(name)
    }

    async fn signed_url(&self, name: &str, ttl: Duration) -> Result<String> {
        if !self.objects.lock().unwrap().contains_key(name) {
            return Err(anyhow!("no such object {}", name));
        }
        Ok(format!("https://blobs.test/{}?expires={}", name, ttl.as_secs()))
    }
}

// --- Encoder ---

/// Joins the files listed in a concat manifest byte for byte.
#[derive(Default)]
pub struct FakeEncoder {
    calls: AtomicUsize,
    pub fail: bool,
}

impl FakeEncoder {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaEncoder for FakeEncoder {
    async fn concat(&self, manifest: &Path, output: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            bail!("encoder exited with status 1");
        }

        let dir = manifest.parent().ok_or_else(|| anyhow!("manifest has no parent"))?;
        let listing = tokio::fs::read_to_string(manifest).await?;
        let mut joined = Vec::new();
        for line in listing.lines() {
            let name = line
                .strip_prefix("file '")
                .and_then(|rest| rest.strip_suffix('\''))
                .ok_or_else(|| anyhow!("bad manifest line {}", line))?;
            joined.extend(tokio::fs::read(dir.join(name)).await?);
        }
        tokio::fs::write(output, joined).await?;
        Ok(())
    }
}

// --- Helpers ---

pub fn request_at(
    installation_id: Uuid,
    status: DownloadStatus,
    timestamp: OffsetDateTime,
) -> DownloadRequest {
    DownloadRequest {
        installation_id,
        request_id: Uuid::new_v4(),
        blob_id: "b".repeat(32),
        ip_address: None,
        status,
        timestamp,
    }
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
