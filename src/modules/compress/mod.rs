use crate::state::AppState;
use axum::Router;
use axum::routing::{delete, get, post};

pub mod dto;
pub mod handler;
pub mod model;
pub mod repository;
pub mod service;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/upload", post(handler::upload_files))
        .route("/progress", get(handler::get_progress))
        .route("/download/{filename}", get(handler::download_file))
        .route("/jobs/{job_id}", delete(handler::cancel_job))
        .route("/health", get(handler::health))
        .route("/status", get(handler::status))
}
