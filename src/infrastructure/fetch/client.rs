use futures_util::StreamExt;
use reqwest::{Client, Response};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use url::Url;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("failed to write download: {0}")]
    Io(#[from] std::io::Error),
}

/// HTTP client for pulling media from the origin.
///
/// Responses are returned whatever their status so callers can decide what a
/// given code means.
#[derive(Debug, Clone)]
pub struct MediaFetcher {
    client: Client,
}

impl MediaFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .read_timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    pub async fn get(&self, url: Url) -> Result<Response, reqwest::Error> {
        self.client.get(url).send().await
    }

    /// Streams the body of `response` into a new file at `path`.
    pub async fn download_to(&self, response: Response, path: &Path) -> Result<u64, FetchError> {
        let mut file = File::create(path).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        file.flush().await?;
        Ok(written)
    }
}
