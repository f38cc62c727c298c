use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use dotenvy::dotenv;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use media_relay::app;
use media_relay::config::settings::AppConfig;
use media_relay::infrastructure::db::pool::{connect_to_db, run_migrations};
use media_relay::infrastructure::encoder::ffmpeg::FfmpegEncoder;
use media_relay::infrastructure::fetch::client::MediaFetcher;
use media_relay::infrastructure::queue::rabbitmq::RabbitMqService;
use media_relay::infrastructure::storage::s3::StorageService;
use media_relay::modules::download::repository::PgDownloadRepository;
use media_relay::state::AppState;
use media_relay::workers::video_processor::{
    start_video_processor, ProcessorSettings, VideoProcessor,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting server...");

    let config = AppConfig::new().context("Missing required configuration")?;

    let pool = connect_to_db(&config.database_url)
        .await
        .context("Failed to connect to PostgreSQL")?;
    run_migrations(&pool).await.context("Failed to run migrations")?;
    let downloads = Arc::new(PgDownloadRepository::new(pool));

    let queue = RabbitMqService::new(&config.rabbitmq_url, &config.queue_name).await?;

    let storage = StorageService::new(
        &config.minio_url,
        &config.s3_region,
        &config.minio_bucket,
        &config.minio_access_key,
        &config.minio_secret_key,
    );
    storage.ensure_bucket().await?;

    if config.worker_enabled {
        let encoder = FfmpegEncoder::new(
            &config.ffmpeg_path,
            Duration::from_secs(config.encoder_timeout_secs),
        );
        let fetcher = MediaFetcher::new(Duration::from_secs(config.fetch_timeout_secs))?;
        let processor = Arc::new(VideoProcessor::new(
            downloads.clone(),
            Arc::new(storage),
            Arc::new(encoder),
            fetcher,
            ProcessorSettings::from_config(&config),
        ));

        let worker_queue = queue.clone();
        let prefetch = config.worker_prefetch;
        tokio::spawn(async move {
            if let Err(e) = start_video_processor(worker_queue, processor, prefetch).await {
                error!("Video processor stopped: {:#}", e);
            }
        });
    } else {
        warn!("Worker disabled, jobs will only be queued");
    }

    let state = AppState::new(downloads, Arc::new(queue));
    let app = app::create_app(state);

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Server running on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
