use anyhow::{anyhow, Result};
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use super::model::{
    DownloadRequest, DownloadRequestRow, DownloadStatus, NewDownloadRequest, ProcessedVideo,
    ProcessedVideoRow,
};
use crate::infrastructure::db::pool::DbPool;

/// Result of a guarded status write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusUpdate {
    Applied,
    /// The request exists but sits in a status the target may not follow.
    Refused(DownloadStatus),
    /// No request with that key exists.
    Missing,
}

/// Record store for download requests and processed videos.
///
/// Timestamps are assigned by the store on every write.
#[async_trait]
pub trait DownloadRepository: Send + Sync {
    /// Most recently updated request of an installation.
    async fn latest_request(&self, installation_id: Uuid) -> Result<Option<DownloadRequest>>;

    async fn insert_request(&self, request: NewDownloadRequest) -> Result<DownloadRequest>;

    /// Moves a request to `status` if it currently sits in one of
    /// `status.predecessors()`.
    async fn advance_status(
        &self,
        installation_id: Uuid,
        request_id: Uuid,
        status: DownloadStatus,
    ) -> Result<StatusUpdate>;

    async fn find_request(
        &self,
        installation_id: Uuid,
        request_id: Uuid,
    ) -> Result<Option<DownloadRequest>>;

    /// Requests updated at or after `since`, newest first.
    async fn list_requests_since(
        &self,
        installation_id: Uuid,
        since: OffsetDateTime,
    ) -> Result<Vec<DownloadRequest>>;

    /// Freshest processed video for `content_hash` updated at or after `since`.
    async fn latest_processed_video(
        &self,
        content_hash: &str,
        since: OffsetDateTime,
    ) -> Result<Option<ProcessedVideo>>;

    /// Idempotent by `(content_hash, blob_id)`; a repeat write refreshes the URL.
    async fn insert_processed_video(
        &self,
        content_hash: &str,
        blob_id: &str,
        signed_url: &str,
    ) -> Result<ProcessedVideo>;

    /// Freshest processed video published under `blob_id`.
    async fn find_processed_video(&self, blob_id: &str) -> Result<Option<ProcessedVideo>>;
}

#[derive(Clone)]
pub struct PgDownloadRepository {
    pool: DbPool,
}

impl PgDownloadRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn into_request(row: DownloadRequestRow) -> Result<DownloadRequest> {
    DownloadRequest::try_from(row).map_err(|e| anyhow!("Corrupt download request row: {}", e))
}

#[async_trait]
impl DownloadRepository for PgDownloadRepository {
    async fn latest_request(&self, installation_id: Uuid) -> Result<Option<DownloadRequest>> {
        let row = sqlx::query_as::<_, DownloadRequestRow>(
            r#"
            SELECT installation_id, request_id, blob_id, ip_address, status, updated_at
            FROM download_requests
            WHERE installation_id = $1
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
        )
        .bind(installation_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(into_request).transpose()
    }

    async fn insert_request(&self, request: NewDownloadRequest) -> Result<DownloadRequest> {
        let row = sqlx::query_as::<_, DownloadRequestRow>(
            r#"
            INSERT INTO download_requests (installation_id, request_id, blob_id, ip_address, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING installation_id, request_id, blob_id, ip_address, status, updated_at
            "#,
        )
        .bind(request.installation_id)
        .bind(request.request_id)
        .bind(&request.blob_id)
        .bind(&request.ip_address)
        .bind(request.status.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| anyhow!("Failed to insert download request: {}", e))?;

        into_request(row)
    }

    async fn advance_status(
        &self,
        installation_id: Uuid,
        request_id: Uuid,
        status: DownloadStatus,
    ) -> Result<StatusUpdate> {
        let allowed: Vec<String> = status
            .predecessors()
            .iter()
            .map(ToString::to_string)
            .collect();

        let result = sqlx::query(
            r#"
            UPDATE download_requests
            SET status = $3, updated_at = NOW()
            WHERE installation_id = $1 AND request_id = $2 AND status = ANY($4)
            "#,
        )
        .bind(installation_id)
        .bind(request_id)
        .bind(status.to_string())
        .bind(&allowed)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow!("Failed to update status of {}: {}", request_id, e))?;

        if result.rows_affected() == 1 {
            return Ok(StatusUpdate::Applied);
        }

        let current: Option<String> = sqlx::query_scalar(
            r#"
            SELECT status FROM download_requests
            WHERE installation_id = $1 AND request_id = $2
            "#,
        )
        .bind(installation_id)
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await?;

        match current {
            Some(raw) => {
                let current = raw
                    .parse::<DownloadStatus>()
                    .map_err(|e| anyhow!("Corrupt status on {}: {}", request_id, e))?;
                Ok(StatusUpdate::Refused(current))
            }
            None => Ok(StatusUpdate::Missing),
        }
    }

    async fn find_request(
        &self,
        installation_id: Uuid,
        request_id: Uuid,
    ) -> Result<Option<DownloadRequest>> {
        let row = sqlx::query_as::<_, DownloadRequestRow>(
            r#"
            SELECT installation_id, request_id, blob_id, ip_address, status, updated_at
            FROM download_requests
            WHERE installation_id = $1 AND request_id = $2
            "#,
        )
        .bind(installation_id)
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(into_request).transpose()
    }

    async fn list_requests_since(
        &self,
        installation_id: Uuid,
        since: OffsetDateTime,
    ) -> Result<Vec<DownloadRequest>> {
        let rows = sqlx::query_as::<_, DownloadRequestRow>(
            r#"
            SELECT installation_id, request_id, blob_id, ip_address, status, updated_at
            FROM download_requests
            WHERE installation_id = $1 AND updated_at >= $2
            ORDER BY updated_at DESC
            "#,
        )
        .bind(installation_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(into_request).collect()
    }

    async fn latest_processed_video(
        &self,
        content_hash: &str,
        since: OffsetDateTime,
    ) -> Result<Option<ProcessedVideo>> {
        let row = sqlx::query_as::<_, ProcessedVideoRow>(
            r#"
            SELECT content_hash, blob_id, signed_url, updated_at
            FROM processed_videos
            WHERE content_hash = $1 AND updated_at >= $2
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
        )
        .bind(content_hash)
        .bind(since)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ProcessedVideo::from))
    }

    async fn insert_processed_video(
        &self,
        content_hash: &str,
        blob_id: &str,
        signed_url: &str,
    ) -> Result<ProcessedVideo> {
        let row = sqlx::query_as::<_, ProcessedVideoRow>(
            r#"
            INSERT INTO processed_videos (content_hash, blob_id, signed_url)
            VALUES ($1, $2, $3)
            ON CONFLICT (content_hash, blob_id)
            DO UPDATE SET signed_url = EXCLUDED.signed_url, updated_at = NOW()
            RETURNING content_hash, blob_id, signed_url, updated_at
            "#,
        )
        .bind(content_hash)
        .bind(blob_id)
        .bind(signed_url)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| anyhow!("Failed to insert processed video: {}", e))?;

        Ok(row.into())
    }

    async fn find_processed_video(&self, blob_id: &str) -> Result<Option<ProcessedVideo>> {
        let row = sqlx::query_as::<_, ProcessedVideoRow>(
            r#"
            SELECT content_hash, blob_id, signed_url, updated_at
            FROM processed_videos
            WHERE blob_id = $1
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
        )
        .bind(blob_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ProcessedVideo::from))
    }
}
