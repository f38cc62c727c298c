use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use url::Url;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::model::DownloadRequest;

const SUPPORTED_EXTENSIONS: [&str; 2] = [".mp4", ".ts"];

/// `media_url` must be an absolute http(s) URL whose text ends in `.mp4` or
/// `.ts`, ignoring case.
pub fn validate_media_url(media_url: &str) -> Result<(), ValidationError> {
    let parsed = Url::parse(media_url).map_err(|_| {
        ValidationError::new("url").with_message("mediaUrl must be a valid URL".into())
    })?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ValidationError::new("url")
            .with_message("mediaUrl must use http or https".into()));
    }

    let lower = media_url.to_ascii_lowercase();
    if !SUPPORTED_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        return Err(ValidationError::new("extension")
            .with_message("mediaUrl must end with .mp4 or .ts".into()));
    }

    Ok(())
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueDownloadRequest {
    pub installation_id: Uuid,
    #[validate(custom(function = "validate_media_url"))]
    #[schema(example = "https://cdn.example.com/live/media_000.ts")]
    pub media_url: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueDownloadResponse {
    pub blob_id: String,
    pub request_id: Uuid,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct DownloadStatusQuery {
    pub installation_id: Uuid,
    pub request_id: Uuid,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct DownloadStatusesQuery {
    pub installation_id: Uuid,
}

#[derive(Debug, Deserialize, Validate, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct DownloadUrlQuery {
    #[validate(length(equal = 32, message = "blobId must be 32 characters"))]
    pub blob_id: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DownloadStatusResponse {
    pub installation_id: Uuid,
    pub request_id: Uuid,
    pub blob_id: String,
    #[schema(example = "COMPLETED")]
    pub status: String,
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub timestamp: OffsetDateTime,
}

impl From<DownloadRequest> for DownloadStatusResponse {
    fn from(r: DownloadRequest) -> Self {
        Self {
            installation_id: r.installation_id,
            request_id: r.request_id,
            blob_id: r.blob_id,
            status: r.status.to_string(),
            timestamp: r.timestamp,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DownloadUrlResponse {
    pub signed_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enqueue(url: &str) -> EnqueueDownloadRequest {
        EnqueueDownloadRequest {
            installation_id: Uuid::new_v4(),
            media_url: url.to_string(),
        }
    }

    #[test]
    fn accepts_supported_extensions_in_any_case() {
        assert!(enqueue("https://cdn.example.com/v/media_000.ts").validate().is_ok());
        assert!(enqueue("https://cdn.example.com/v/movie.MP4").validate().is_ok());
        assert!(enqueue("http://cdn.example.com/v/segment-1-a.Ts").validate().is_ok());
    }

    #[test]
    fn rejects_other_extensions_and_bad_urls() {
        assert!(enqueue("https://cdn.example.com/v/playlist.m3u8").validate().is_err());
        assert!(enqueue("https://cdn.example.com/v/movie.mp4?token=1").validate().is_err());
        assert!(enqueue("not a url.mp4").validate().is_err());
        assert!(enqueue("ftp://cdn.example.com/v/movie.mp4").validate().is_err());
    }

    #[test]
    fn blob_id_must_be_32_chars() {
        let short = DownloadUrlQuery { blob_id: "abc".into() };
        assert!(short.validate().is_err());

        let exact = DownloadUrlQuery { blob_id: "a".repeat(32) };
        assert!(exact.validate().is_ok());
    }
}
