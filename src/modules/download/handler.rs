use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use validator::Validate;

use super::dto::*;
use super::service::DownloadService;
use crate::common::client_ip::forwarded_for;
use crate::common::error::AppError;
use crate::common::response::{ApiResponse, ApiSuccess};
use crate::state::AppState;

/// Queue a download, or reuse a recent one for the same source
#[utoipa::path(
    post,
    path = "/api/v1/downloads",
    request_body = EnqueueDownloadRequest,
    responses(
        (status = 202, description = "Download accepted", body = ApiResponse<EnqueueDownloadResponse>),
        (status = 400, description = "Bad Request"),
        (status = 429, description = "Too Many Requests"),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Downloads"
)]
pub async fn enqueue_download(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<EnqueueDownloadRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(req) = match payload {
        Ok(body) => body,
        Err(rejection) => return AppError::from(rejection).into_response(),
    };

    match DownloadService::enqueue(&state, req, forwarded_for(&headers)).await {
        Ok(res) => ApiSuccess::accepted(res, "Download accepted").into_response(),
        Err(e) => e.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/downloads/status",
    params(DownloadStatusQuery),
    responses(
        (status = 200, description = "Download status", body = ApiResponse<DownloadStatusResponse>),
        (status = 400, description = "Bad Request"),
        (status = 404, description = "Download request not found"),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Downloads"
)]
pub async fn get_download_status(
    State(state): State<AppState>,
    query: Result<Query<DownloadStatusQuery>, QueryRejection>,
) -> impl IntoResponse {
    let Query(query) = match query {
        Ok(q) => q,
        Err(rejection) => return AppError::from(rejection).into_response(),
    };

    match DownloadService::get_status(&state, query.installation_id, query.request_id).await {
        Ok(res) => ApiSuccess::ok(res, "Download status retrieved").into_response(),
        Err(e) => e.into_response(),
    }
}

/// Requests of an installation from the last 20 hours, newest first
#[utoipa::path(
    get,
    path = "/api/v1/downloads/statuses",
    params(DownloadStatusesQuery),
    responses(
        (status = 200, description = "Recent downloads", body = ApiResponse<Vec<DownloadStatusResponse>>),
        (status = 400, description = "Bad Request"),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Downloads"
)]
pub async fn list_download_statuses(
    State(state): State<AppState>,
    query: Result<Query<DownloadStatusesQuery>, QueryRejection>,
) -> impl IntoResponse {
    let Query(query) = match query {
        Ok(q) => q,
        Err(rejection) => return AppError::from(rejection).into_response(),
    };

    match DownloadService::list_statuses(&state, query.installation_id).await {
        Ok(res) => ApiSuccess::ok(res, "Download statuses retrieved").into_response(),
        Err(e) => e.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/downloads/url",
    params(DownloadUrlQuery),
    responses(
        (status = 200, description = "Signed download URL", body = ApiResponse<DownloadUrlResponse>),
        (status = 400, description = "Bad Request"),
        (status = 404, description = "Download not found"),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Downloads"
)]
pub async fn get_download_url(
    State(state): State<AppState>,
    query: Result<Query<DownloadUrlQuery>, QueryRejection>,
) -> impl IntoResponse {
    let Query(query) = match query {
        Ok(q) => q,
        Err(rejection) => return AppError::from(rejection).into_response(),
    };

    if let Err(e) = query.validate() {
        return AppError::from(e).into_response();
    }

    match DownloadService::get_download_url(&state, &query.blob_id).await {
        Ok(res) => ApiSuccess::ok(res, "Download URL retrieved").into_response(),
        Err(e) => e.into_response(),
    }
}
