use utoipa::OpenApi;

use crate::modules::download::dto::*;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::modules::download::handler::enqueue_download,
        crate::modules::download::handler::get_download_status,
        crate::modules::download::handler::list_download_statuses,
        crate::modules::download::handler::get_download_url,
    ),
    components(
        schemas(
            EnqueueDownloadRequest,
            EnqueueDownloadResponse,
            DownloadStatusResponse,
            DownloadUrlResponse,
        )
    ),
    tags(
        (name = "Downloads", description = "Remote media ingestion and download links")
    )
)]
pub struct ApiDoc;
