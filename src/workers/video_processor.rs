use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use bytes::Bytes;
use futures_util::StreamExt;
use reqwest::StatusCode;
use lapin::options::{BasicAckOptions, BasicNackOptions};
use thiserror::Error;
use tracing::{debug, error, info, warn, Instrument};
use url::Url;

use super::segments::{self, MediaProtocol, SegmentTemplate};
use crate::config::settings::AppConfig;
use crate::infrastructure::encoder::MediaEncoder;
use crate::infrastructure::fetch::client::{FetchError, MediaFetcher};
use crate::infrastructure::queue::rabbitmq::RabbitMqService;
use crate::infrastructure::storage::BlobStore;
use crate::modules::download::events::DownloadJob;
use crate::modules::download::model::{DownloadStatus, content_hash};
use crate::modules::download::repository::{DownloadRepository, StatusUpdate};

pub const VIDEO_CONTENT_TYPE: &str = "video/mp4";
pub const SIGNED_URL_TTL: Duration = Duration::from_secs(20 * 60 * 60);
const OUTPUT_FILE: &str = "output.mp4";

#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    /// Parent of the per-job scratch directories.
    pub work_dir: PathBuf,
    /// Upper bound on segments fetched for one job.
    pub max_segments: u32,
    pub signed_url_ttl: Duration,
}

impl ProcessorSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            work_dir: config.work_dir.clone(),
            max_segments: config.max_segments,
            signed_url_ttl: SIGNED_URL_TTL,
        }
    }
}

/// Why a job stopped before publishing an artifact.
#[derive(Debug, Error)]
pub enum ProcessingFailure {
    #[error("unsupported media format")]
    MediaFormat,

    #[error("unrecognised segment filename `{0}`")]
    FilenameFormat(String),

    #[error("origin responded with HTTP {0}")]
    HttpStatus(u16),

    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    #[error("origin served more than {0} segments")]
    SegmentLimit(u32),

    #[error("encoding failed: {0:#}")]
    Encoding(anyhow::Error),

    #[error("{0:#}")]
    Internal(anyhow::Error),

    /// Another delivery of the same job already moved the request on.
    #[error("request is already {current}, cannot move to {target}")]
    Superseded {
        target: DownloadStatus,
        current: DownloadStatus,
    },

    #[error("download request does not exist")]
    RequestMissing,
}

impl ProcessingFailure {
    /// Terminal status to record, or `None` when nothing should be written.
    pub fn status(&self) -> Option<DownloadStatus> {
        let status = match self {
            ProcessingFailure::MediaFormat => DownloadStatus::MediaFormatError,
            ProcessingFailure::FilenameFormat(_) => DownloadStatus::FilenameFormatFault,
            ProcessingFailure::HttpStatus(code) => DownloadStatus::DownloadFailedWith(*code),
            ProcessingFailure::Network(_) => DownloadStatus::DownloadFailedNetworkError,
            ProcessingFailure::SegmentLimit(_) => DownloadStatus::SegmentLimitExceeded,
            ProcessingFailure::Encoding(_) => DownloadStatus::EncodingFault,
            ProcessingFailure::Internal(_) => DownloadStatus::ProcessingFault,
            ProcessingFailure::Superseded { .. } | ProcessingFailure::RequestMissing => {
                return None;
            }
        };
        Some(status)
    }

    fn internal(err: impl Into<anyhow::Error>) -> Self {
        ProcessingFailure::Internal(err.into())
    }
}

impl From<FetchError> for ProcessingFailure {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Network(e) => ProcessingFailure::Network(e),
            FetchError::Io(e) => ProcessingFailure::internal(e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed(DownloadStatus),
    /// The job was a duplicate delivery or its request could not be updated.
    Skipped,
    /// No request row matches the job; nothing was downloaded or written.
    Orphaned,
}

/// What one segment response means for the sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmentStep {
    Keep,
    /// Any 4xx: the origin has no more segments.
    End,
    /// 1xx, 3xx and 5xx abort the job.
    Fail(u16),
}

fn segment_step(status: StatusCode) -> SegmentStep {
    if status.is_success() {
        SegmentStep::Keep
    } else if status.is_client_error() {
        SegmentStep::End
    } else {
        SegmentStep::Fail(status.as_u16())
    }
}

enum Plan {
    Segmented(SegmentTemplate),
    Direct,
}

/// Turns a [`DownloadJob`] into a published artifact.
///
/// Never returns an error: every outcome after the job is accepted is
/// recorded on its download request.
pub struct VideoProcessor {
    downloads: Arc<dyn DownloadRepository>,
    blobs: Arc<dyn BlobStore>,
    encoder: Arc<dyn MediaEncoder>,
    fetcher: MediaFetcher,
    settings: ProcessorSettings,
}

impl VideoProcessor {
    pub fn new(
        downloads: Arc<dyn DownloadRepository>,
        blobs: Arc<dyn BlobStore>,
        encoder: Arc<dyn MediaEncoder>,
        fetcher: MediaFetcher,
        settings: ProcessorSettings,
    ) -> Self {
        Self {
            downloads,
            blobs,
            encoder,
            fetcher,
            settings,
        }
    }

    pub async fn handle(&self, job: &DownloadJob) -> JobOutcome {
        let span = tracing::info_span!(
            "download_job",
            installation_id = %job.installation_id,
            request_id = %job.request_id,
            blob_id = %job.blob_id,
        );

        async {
            info!(media_url = %job.media_url, "Processing download job");
            match self.process(job).await {
                Ok(()) => {
                    info!("Download job completed");
                    JobOutcome::Completed
                }
                Err(failure) => self.record_failure(job, failure).await,
            }
        }
        .instrument(span)
        .await
    }

    async fn process(&self, job: &DownloadJob) -> Result<(), ProcessingFailure> {
        let url = Url::parse(&job.media_url).map_err(|_| ProcessingFailure::MediaFormat)?;

        let plan = match MediaProtocol::detect(&url).ok_or(ProcessingFailure::MediaFormat)? {
            MediaProtocol::Segmented => {
                let name = segments::file_name(&url).unwrap_or_default();
                let template = SegmentTemplate::derive(name)
                    .ok_or_else(|| ProcessingFailure::FilenameFormat(name.to_string()))?;
                debug!(%template, "Derived segment template");
                Plan::Segmented(template)
            }
            MediaProtocol::Direct => Plan::Direct,
        };

        self.checkpoint(job, DownloadStatus::Downloading).await?;

        let scratch = tempfile::Builder::new()
            .prefix("media-relay-")
            .tempdir_in(&self.settings.work_dir)
            .map_err(ProcessingFailure::internal)?;

        let result = self.run(job, &url, &plan, scratch.path()).await;

        let scratch_path = scratch.path().to_path_buf();
        if let Err(e) = scratch.close() {
            warn!(path = %scratch_path.display(), "Failed to remove job directory: {}", e);
        }

        result
    }

    async fn run(
        &self,
        job: &DownloadJob,
        url: &Url,
        plan: &Plan,
        dir: &Path,
    ) -> Result<(), ProcessingFailure> {
        let output = dir.join(OUTPUT_FILE);

        match plan {
            Plan::Segmented(template) => {
                let files = self.download_segments(url, template, dir).await?;
                let manifest = segments::write_manifest(dir, &files)
                    .await
                    .map_err(ProcessingFailure::internal)?;

                self.checkpoint(job, DownloadStatus::Encoding).await?;

                if files.is_empty() {
                    return Err(ProcessingFailure::Encoding(anyhow!("origin served no segments")));
                }

                self.encoder
                    .concat(&manifest, &output)
                    .await
                    .map_err(ProcessingFailure::Encoding)?;
            }
            Plan::Direct => self.download_direct(url, &output).await?,
        }

        self.publish(job, &output).await
    }

    /// Fetches segments 1, 2, ... in order until the origin answers 4xx.
    /// Returns the local file names in download order.
    async fn download_segments(
        &self,
        url: &Url,
        template: &SegmentTemplate,
        dir: &Path,
    ) -> Result<Vec<String>, ProcessingFailure> {
        let max = self.settings.max_segments;
        let mut files = Vec::new();
        let mut index = 1u32;

        loop {
            let segment_url = segments::sibling_url(url, &template.segment_name(index));
            let response = self
                .fetcher
                .get(segment_url)
                .await
                .map_err(ProcessingFailure::Network)?;

            match segment_step(response.status()) {
                SegmentStep::Keep => {}
                SegmentStep::End => {
                    info!(
                        segments = files.len(),
                        status = response.status().as_u16(),
                        "End of segment sequence"
                    );
                    return Ok(files);
                }
                SegmentStep::Fail(code) => return Err(ProcessingFailure::HttpStatus(code)),
            }
            if index > max {
                return Err(ProcessingFailure::SegmentLimit(max));
            }

            let body = response.bytes().await.map_err(ProcessingFailure::Network)?;
            let local_name = format!("{:06}.ts", index);
            tokio::fs::write(dir.join(&local_name), &body)
                .await
                .map_err(ProcessingFailure::internal)?;
            debug!(index, size = body.len(), "Segment downloaded");
            files.push(local_name);
            index += 1;
        }
    }

    async fn download_direct(&self, url: &Url, output: &Path) -> Result<(), ProcessingFailure> {
        let response = self
            .fetcher
            .get(url.clone())
            .await
            .map_err(ProcessingFailure::Network)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProcessingFailure::HttpStatus(status.as_u16()));
        }

        let written = self.fetcher.download_to(response, output).await?;
        info!(bytes = written, "Direct download finished");
        Ok(())
    }

    /// Uploads the output and records the finished state. The two final writes
    /// are independent; a failure of one does not undo the other.
    async fn publish(&self, job: &DownloadJob, output: &Path) -> Result<(), ProcessingFailure> {
        let data = tokio::fs::read(output)
            .await
            .map_err(ProcessingFailure::internal)?;
        let size = data.len();

        let blob_name = self
            .blobs
            .put(Bytes::from(data), VIDEO_CONTENT_TYPE)
            .await
            .map_err(ProcessingFailure::Internal)?;
        let signed_url = self
            .blobs
            .signed_url(&blob_name, self.settings.signed_url_ttl)
            .await
            .map_err(ProcessingFailure::Internal)?;
        info!(%blob_name, size, "Artifact uploaded");

        let hash = content_hash(&job.media_url);
        let (status, video) = tokio::join!(
            self.downloads.advance_status(
                job.installation_id,
                job.request_id,
                DownloadStatus::Completed
            ),
            self.downloads
                .insert_processed_video(&hash, &job.blob_id, &signed_url),
        );

        match status {
            Ok(StatusUpdate::Applied) => {}
            Ok(other) => warn!(?other, "Request could not be marked completed"),
            Err(e) => error!("Failed to mark request completed: {:#}", e),
        }
        if let Err(e) = video {
            error!("Failed to record processed video: {:#}", e);
        }

        Ok(())
    }

    async fn checkpoint(&self, job: &DownloadJob, status: DownloadStatus) -> Result<(), ProcessingFailure> {
        let update = self
            .downloads
            .advance_status(job.installation_id, job.request_id, status)
            .await
            .map_err(ProcessingFailure::Internal)?;

        match update {
            StatusUpdate::Applied => {
                info!(%status, "Status updated");
                Ok(())
            }
            StatusUpdate::Refused(current) => Err(ProcessingFailure::Superseded {
                target: status,
                current,
            }),
            StatusUpdate::Missing => Err(ProcessingFailure::RequestMissing),
        }
    }

    async fn record_failure(&self, job: &DownloadJob, failure: ProcessingFailure) -> JobOutcome {
        let Some(status) = failure.status() else {
            if matches!(failure, ProcessingFailure::RequestMissing) {
                error!("No download request for job");
                return JobOutcome::Orphaned;
            }
            info!("Skipping job: {}", failure);
            return JobOutcome::Skipped;
        };

        warn!(%status, "Download job failed: {}", failure);

        match self
            .downloads
            .advance_status(job.installation_id, job.request_id, status)
            .await
        {
            Ok(StatusUpdate::Applied) => JobOutcome::Failed(status),
            Ok(StatusUpdate::Refused(current)) => {
                warn!(%status, %current, "Failure status not recorded");
                JobOutcome::Skipped
            }
            Ok(StatusUpdate::Missing) => {
                error!(%status, "No download request for job");
                JobOutcome::Orphaned
            }
            Err(e) => {
                error!(%status, "Failed to record job failure: {:#}", e);
                JobOutcome::Skipped
            }
        }
    }
}

/// Consumes download jobs until the queue closes. Handled deliveries are acked;
/// failures live on the request status, not in redeliveries. A job whose
/// request row is missing is requeued once, then dropped.
pub async fn start_video_processor(
    queue: RabbitMqService,
    processor: Arc<VideoProcessor>,
    prefetch: u16,
) -> anyhow::Result<()> {
    info!("🎥 Starting video processor...");

    let mut consumer = queue.consume("video_processor", prefetch).await?;

    info!("🎥 Video processor listening on '{}'", queue.queue_name());

    while let Some(delivery) = consumer.next().await {
        let delivery = match delivery {
            Ok(d) => d,
            Err(e) => {
                error!("Consumer error: {}", e);
                continue;
            }
        };

        let outcome = match serde_json::from_slice::<DownloadJob>(&delivery.data) {
            Ok(job) => {
                let outcome = processor.handle(&job).await;
                debug!(request_id = %job.request_id, ?outcome, "Job handled");
                Some(outcome)
            }
            Err(e) => {
                error!("Dropping malformed job payload: {}", e);
                None
            }
        };

        let settled = if outcome == Some(JobOutcome::Orphaned) {
            let requeue = !delivery.redelivered;
            warn!(requeue, "Rejecting job without a download request");
            delivery
                .nack(BasicNackOptions {
                    requeue,
                    ..BasicNackOptions::default()
                })
                .await
        } else {
            delivery.ack(BasicAckOptions::default()).await
        };

        if let Err(e) = settled {
            error!("Failed to settle message: {}", e);
        }
    }

    warn!("Video processor consumer closed");
    Ok(())
}
