use anyhow::Result;
use async_trait::async_trait;

use crate::modules::download::events::DownloadJob;

pub mod rabbitmq;

/// Outbound side of the job queue. Delivery is at-least-once and unordered.
#[async_trait]
pub trait JobPublisher: Send + Sync {
    async fn publish_job(&self, job: &DownloadJob) -> Result<()>;
}
