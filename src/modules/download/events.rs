use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Queue message for one download. Mirrors the `DownloadRequest` it was
/// published for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadJob {
    pub installation_id: Uuid,
    pub request_id: Uuid,
    pub media_url: String,
    pub blob_id: String,
}
