use std::path::PathBuf;

use serde::Deserialize;
use crate::config::env::{self, EnvKey};

pub const DEFAULT_QUEUE_NAME: &str = "video-downloads";

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub server_port: u16,
    pub database_url: String,
    pub rabbitmq_url: String,
    pub queue_name: String,
    pub minio_url: String,
    pub minio_bucket: String,
    pub minio_access_key: String,
    pub minio_secret_key: String,
    pub s3_region: String,
    pub ffmpeg_path: String,
    pub work_dir: PathBuf,
    pub max_segments: u32,
    pub encoder_timeout_secs: u64,
    pub fetch_timeout_secs: u64,
    pub worker_enabled: bool,
    pub worker_prefetch: u16,
}

impl AppConfig {
    pub fn new() -> Result<Self, std::env::VarError> {
        let work_dir = env::get(EnvKey::WorkDir)
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir());

        Ok(Self {
            server_port: env::get_parsed(EnvKey::ServerPort, 3000),
            database_url: env::get(EnvKey::DatabaseUrl)?,
            rabbitmq_url: env::get(EnvKey::RabbitMqUrl)?,
            queue_name: env::get_or(EnvKey::QueueName, DEFAULT_QUEUE_NAME),
            minio_url: env::get(EnvKey::MinioUrl)?,
            minio_bucket: env::get(EnvKey::MinioBucket)?,
            minio_access_key: env::get(EnvKey::MinioAccessKey)?,
            minio_secret_key: env::get(EnvKey::MinioSecretKey)?,
            s3_region: env::get_or(EnvKey::S3Region, "us-east-1"),
            ffmpeg_path: env::get_or(EnvKey::FfmpegPath, "ffmpeg"),
            work_dir,
            max_segments: env::get_parsed(EnvKey::MaxSegments, 10_000),
            encoder_timeout_secs: env::get_parsed(EnvKey::EncoderTimeoutSecs, 600),
            fetch_timeout_secs: env::get_parsed(EnvKey::FetchTimeoutSecs, 60),
            worker_enabled: env::get_parsed(EnvKey::WorkerEnabled, true),
            worker_prefetch: env::get_parsed(EnvKey::WorkerPrefetch, 1),
        })
    }
}
