use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

/// Length of the public blob identifier handed to clients.
pub const BLOB_ID_LEN: usize = 32;

/// Lifecycle of a [`DownloadRequest`].
///
/// `Queued -> Downloading -> Encoding -> Completed`, with the direct protocol
/// skipping `Encoding`. Every other variant is a terminal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DownloadStatus {
    Queued,
    Downloading,
    Encoding,
    Completed,
    FilenameFormatFault,
    MediaFormatError,
    DownloadFailedWith(u16),
    DownloadFailedNetworkError,
    SegmentLimitExceeded,
    EncodingFault,
    ProcessingFault,
}

const DOWNLOAD_FAILED_WITH: &str = "DOWNLOAD_FAILED_WITH_";

impl DownloadStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            DownloadStatus::Queued | DownloadStatus::Downloading | DownloadStatus::Encoding
        )
    }

    /// States a request may be in for a write of `self` to be accepted.
    ///
    /// `Queued` has no predecessors; it is only ever written on insert.
    pub fn predecessors(&self) -> &'static [DownloadStatus] {
        use DownloadStatus::*;
        match self {
            Queued => &[],
            Downloading | FilenameFormatFault | MediaFormatError => &[Queued],
            Encoding | DownloadFailedWith(_) | DownloadFailedNetworkError | SegmentLimitExceeded => {
                &[Downloading]
            }
            EncodingFault => &[Encoding],
            Completed => &[Downloading, Encoding],
            ProcessingFault => &[Queued, Downloading, Encoding],
        }
    }

    pub fn can_follow(&self, current: DownloadStatus) -> bool {
        self.predecessors().contains(&current)
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadStatus::Queued => f.write_str("QUEUED"),
            DownloadStatus::Downloading => f.write_str("DOWNLOADING"),
            DownloadStatus::Encoding => f.write_str("ENCODING"),
            DownloadStatus::Completed => f.write_str("COMPLETED"),
            DownloadStatus::FilenameFormatFault => f.write_str("FILENAME_FORMAT_FAULT"),
            DownloadStatus::MediaFormatError => f.write_str("MEDIA_FORMAT_ERROR"),
            DownloadStatus::DownloadFailedWith(code) => write!(f, "{}{}", DOWNLOAD_FAILED_WITH, code),
            DownloadStatus::DownloadFailedNetworkError => f.write_str("DOWNLOAD_FAILED_NETWORK_ERROR"),
            DownloadStatus::SegmentLimitExceeded => f.write_str("SEGMENT_LIMIT_EXCEEDED"),
            DownloadStatus::EncodingFault => f.write_str("ENCODING_FAULT"),
            DownloadStatus::ProcessingFault => f.write_str("PROCESSING_FAULT"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown download status `{0}`")]
pub struct UnknownStatus(pub String);

impl FromStr for DownloadStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let status = match s {
            "QUEUED" => DownloadStatus::Queued,
            "DOWNLOADING" => DownloadStatus::Downloading,
            "ENCODING" => DownloadStatus::Encoding,
            "COMPLETED" => DownloadStatus::Completed,
            "FILENAME_FORMAT_FAULT" => DownloadStatus::FilenameFormatFault,
            "MEDIA_FORMAT_ERROR" => DownloadStatus::MediaFormatError,
            "DOWNLOAD_FAILED_NETWORK_ERROR" => DownloadStatus::DownloadFailedNetworkError,
            "SEGMENT_LIMIT_EXCEEDED" => DownloadStatus::SegmentLimitExceeded,
            "ENCODING_FAULT" => DownloadStatus::EncodingFault,
            "PROCESSING_FAULT" => DownloadStatus::ProcessingFault,
            other => other
                .strip_prefix(DOWNLOAD_FAILED_WITH)
                .and_then(|code| code.parse::<u16>().ok())
                .map(DownloadStatus::DownloadFailedWith)
                .ok_or_else(|| UnknownStatus(other.to_string()))?,
        };
        Ok(status)
    }
}

impl Serialize for DownloadStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DownloadStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One client submission, partitioned by installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub installation_id: Uuid,
    pub request_id: Uuid,
    pub blob_id: String,
    pub ip_address: Option<String>,
    pub status: DownloadStatus,
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewDownloadRequest {
    pub installation_id: Uuid,
    pub request_id: Uuid,
    pub blob_id: String,
    pub ip_address: Option<String>,
    pub status: DownloadStatus,
}

/// A finished artifact, partitioned by the digest of its source URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedVideo {
    pub content_hash: String,
    pub blob_id: String,
    pub signed_url: String,
    pub timestamp: OffsetDateTime,
}

/// Cache key for a source URL: lowercase hex MD5 of the exact string.
pub fn content_hash(media_url: &str) -> String {
    format!("{:x}", md5::compute(media_url.as_bytes()))
}

// --- Store rows ---

#[derive(Debug, FromRow)]
pub struct DownloadRequestRow {
    pub installation_id: Uuid,
    pub request_id: Uuid,
    pub blob_id: String,
    pub ip_address: Option<String>,
    pub status: String,
    pub updated_at: OffsetDateTime,
}

impl TryFrom<DownloadRequestRow> for DownloadRequest {
    type Error = UnknownStatus;

    fn try_from(row: DownloadRequestRow) -> Result<Self, Self::Error> {
        Ok(Self {
            installation_id: row.installation_id,
            request_id: row.request_id,
            blob_id: row.blob_id,
            ip_address: row.ip_address,
            status: row.status.parse()?,
            timestamp: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct ProcessedVideoRow {
    pub content_hash: String,
    pub blob_id: String,
    pub signed_url: String,
    pub updated_at: OffsetDateTime,
}

impl From<ProcessedVideoRow> for ProcessedVideo {
    fn from(row: ProcessedVideoRow) -> Self {
        Self {
            content_hash: row.content_hash,
            blob_id: row.blob_id,
            signed_url: row.signed_url,
            timestamp: row.updated_at,
        }
    }
}
