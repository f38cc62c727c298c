use std::env;
use std::str::FromStr;

pub enum EnvKey {
    ServerPort,
    DatabaseUrl,
    RabbitMqUrl,
    QueueName,
    MinioUrl,
    MinioBucket,
    MinioAccessKey,
    MinioSecretKey,
    S3Region,
    FfmpegPath,
    WorkDir,
    MaxSegments,
    EncoderTimeoutSecs,
    FetchTimeoutSecs,
    WorkerEnabled,
    WorkerPrefetch,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::ServerPort => "APP_PORT",
            EnvKey::DatabaseUrl => "DATABASE_URL",
            EnvKey::RabbitMqUrl => "RABBITMQ_URL",
            EnvKey::QueueName => "QUEUE_NAME",
            EnvKey::MinioUrl => "MINIO_ENDPOINT",
            EnvKey::MinioBucket => "MINIO_BUCKET_VIDEOS",
            EnvKey::MinioAccessKey => "AWS_ACCESS_KEY_ID",
            EnvKey::MinioSecretKey => "AWS_SECRET_ACCESS_KEY",
            EnvKey::S3Region => "S3_REGION",
            EnvKey::FfmpegPath => "FFMPEG_PATH",
            EnvKey::WorkDir => "WORK_DIR",
            EnvKey::MaxSegments => "MAX_SEGMENTS",
            EnvKey::EncoderTimeoutSecs => "ENCODER_TIMEOUT_SECS",
            EnvKey::FetchTimeoutSecs => "FETCH_TIMEOUT_SECS",
            EnvKey::WorkerEnabled => "WORKER_ENABLED",
            EnvKey::WorkerPrefetch => "WORKER_PREFETCH",
        }
    }
}

pub fn get(key: EnvKey) -> Result<String, env::VarError> {
    env::var(key.as_str())
}

pub fn get_or(key: EnvKey, default: &str) -> String {
    env::var(key.as_str()).unwrap_or_else(|_| default.to_string())
}

/// Falls back to `default` when the variable is unset or does not parse.
pub fn get_parsed<T: FromStr>(key: EnvKey, default: T) -> T {
    match get(key) {
        Ok(val) => val.trim().parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}
