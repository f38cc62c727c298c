use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

pub mod ffmpeg;

/// External step that joins an ordered list of media files into one container
/// without re-encoding.
#[async_trait]
pub trait MediaEncoder: Send + Sync {
    /// `manifest` is an ffmpeg concat list; `output` must not exist yet.
    async fn concat(&self, manifest: &Path, output: &Path) -> Result<()>;
}
