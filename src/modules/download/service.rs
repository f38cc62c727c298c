use time::{Duration, OffsetDateTime};
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use validator::Validate;

use super::dto::{
    DownloadStatusResponse, DownloadUrlResponse, EnqueueDownloadRequest, EnqueueDownloadResponse,
};
use super::events::DownloadJob;
use super::model::{BLOB_ID_LEN, DownloadStatus, NewDownloadRequest, content_hash};
use super::repository::StatusUpdate;
use crate::common::error::AppError;
use crate::common::token::random_token;
use crate::state::AppState;

/// A second request from the same installation within this many whole seconds
/// is rejected.
pub const RATE_LIMIT_WINDOW_SECS: i64 = 3;

/// How long a processed video may be handed out again for the same source URL.
pub const CACHE_WINDOW: Duration = Duration::hours(11);

/// How far back `list_statuses` looks.
pub const STATUS_WINDOW: Duration = Duration::hours(20);

pub struct DownloadService;

impl DownloadService {
    /// Rate-limits, deduplicates against recent artifacts, and either reuses a
    /// cached blob or records a queued request and publishes its job.
    pub async fn enqueue(
        state: &AppState,
        req: EnqueueDownloadRequest,
        ip_address: Option<String>,
    ) -> Result<EnqueueDownloadResponse, AppError> {
        req.validate()?;

        let now = OffsetDateTime::now_utc();

        if let Some(latest) = state.downloads.latest_request(req.installation_id).await? {
            if (now - latest.timestamp).whole_seconds() <= RATE_LIMIT_WINDOW_SECS {
                debug!(installation_id = %req.installation_id, "Rate limited");
                return Err(AppError::RateLimited);
            }
        }

        let hash = content_hash(&req.media_url);
        let cached = state
            .downloads
            .latest_processed_video(&hash, now - CACHE_WINDOW)
            .await?;

        let request_id = Uuid::new_v4();
        let (blob_id, status) = match cached {
            Some(video) => {
                info!(%request_id, blob_id = %video.blob_id, "Reusing processed video");
                (video.blob_id, DownloadStatus::Completed)
            }
            None => (random_token(BLOB_ID_LEN), DownloadStatus::Queued),
        };

        // The row must exist before a worker can see the job.
        state
            .downloads
            .insert_request(NewDownloadRequest {
                installation_id: req.installation_id,
                request_id,
                blob_id: blob_id.clone(),
                ip_address,
                status,
            })
            .await?;

        if status == DownloadStatus::Queued {
            let job = DownloadJob {
                installation_id: req.installation_id,
                request_id,
                media_url: req.media_url,
                blob_id: blob_id.clone(),
            };

            if let Err(e) = state.jobs.publish_job(&job).await {
                Self::abandon(state, &job).await;
                return Err(e.into());
            }
            info!(%request_id, %blob_id, "Download job queued");
        }

        Ok(EnqueueDownloadResponse { blob_id, request_id })
    }

    /// Marks a request whose job never reached the queue as faulted.
    async fn abandon(state: &AppState, job: &DownloadJob) {
        match state
            .downloads
            .advance_status(job.installation_id, job.request_id, DownloadStatus::ProcessingFault)
            .await
        {
            Ok(StatusUpdate::Applied) => {
                warn!(request_id = %job.request_id, "Job publish failed, request marked faulted")
            }
            Ok(other) => warn!(request_id = %job.request_id, ?other, "Job publish failed"),
            Err(e) => error!(request_id = %job.request_id, "Failed to mark unpublished request: {:#}", e),
        }
    }

    pub async fn get_status(
        state: &AppState,
        installation_id: Uuid,
        request_id: Uuid,
    ) -> Result<DownloadStatusResponse, AppError> {
        let request = state
            .downloads
            .find_request(installation_id, request_id)
            .await?
            .ok_or(AppError::NotFound("Download request"))?;

        Ok(request.into())
    }

    pub async fn list_statuses(
        state: &AppState,
        installation_id: Uuid,
    ) -> Result<Vec<DownloadStatusResponse>, AppError> {
        let since = OffsetDateTime::now_utc() - STATUS_WINDOW;
        let requests = state
            .downloads
            .list_requests_since(installation_id, since)
            .await?;

        Ok(requests.into_iter().map(DownloadStatusResponse::from).collect())
    }

    pub async fn get_download_url(
        state: &AppState,
        blob_id: &str,
    ) -> Result<DownloadUrlResponse, AppError> {
        let video = state
            .downloads
            .find_processed_video(blob_id)
            .await?
            .filter(|v| !v.signed_url.is_empty())
            .ok_or(AppError::NotFound("Download"))?;

        Ok(DownloadUrlResponse {
            signed_url: video.signed_url,
        })
    }
}
