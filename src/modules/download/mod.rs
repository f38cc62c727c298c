use axum::Router;
use axum::routing::{get, post};
use crate::state::AppState;

pub mod dto;
pub mod events;
pub mod handler;
pub mod model;
pub mod repository;
pub mod service;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/downloads", post(handler::enqueue_download))
        .route("/downloads/status", get(handler::get_download_status))
        .route("/downloads/statuses", get(handler::list_download_statuses))
        .route("/downloads/url", get(handler::get_download_url))
}
