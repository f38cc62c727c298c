use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use super::MediaEncoder;

/// Runs `ffmpeg -f concat ... -c copy` as a child process.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    binary: PathBuf,
    timeout: Duration,
}

impl FfmpegEncoder {
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    pub fn concat_args(manifest: &Path, output: &Path) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-v".to_string(),
            "error".to_string(),
            "-f".to_string(),
            "concat".to_string(),
            "-safe".to_string(),
            "0".to_string(),
            "-i".to_string(),
            manifest.to_string_lossy().to_string(),
            "-c".to_string(),
            "copy".to_string(),
            output.to_string_lossy().to_string(),
        ]
    }
}

#[async_trait]
impl MediaEncoder for FfmpegEncoder {
    async fn concat(&self, manifest: &Path, output: &Path) -> Result<()> {
        let args = Self::concat_args(manifest, output);
        debug!("Running {} {}", self.binary.display(), args.join(" "));

        let child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn {}", self.binary.display()))?;

        // Dropping the future on timeout drops the child, which kills it.
        let output_result = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.context("Failed to wait for ffmpeg")?,
            Err(_) => {
                warn!("ffmpeg timed out after {:?}, killing process", self.timeout);
                return Err(anyhow!("ffmpeg timed out after {} seconds", self.timeout.as_secs()));
            }
        };

        if !output_result.status.success() {
            let stderr = String::from_utf8_lossy(&output_result.stderr);
            return Err(anyhow!(
                "ffmpeg exited with {}: {}",
                output_result.status,
                stderr.trim()
            ));
        }

        Ok(())
    }
}
