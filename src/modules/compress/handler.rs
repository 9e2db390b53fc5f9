use super::dto::{
    BatchSummary, CancelResponse, HealthResponse, ProgressQuery, ProgressResponse, StatusResponse,
    UploadQuery,
};
use super::service::{CompressService, UploadBatch};
use crate::common::error::AppError;
use crate::common::response::{ApiResponse, ApiSuccess};
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{Multipart, Path, Query, State, multipart::MultipartError},
    http::{StatusCode, header},
    response::IntoResponse,
};
use futures_util::StreamExt;
use std::io;
use tokio_util::io::ReaderStream;
use tracing::warn;
use validator::Validate;

/// Upload and compress one or more media files
#[utoipa::path(
    post,
    path = "/api/v1/upload",
    params(UploadQuery),
    request_body(content = String, content_type = "multipart/form-data", description = "One or more `file` / `files` fields"),
    responses(
        (status = 200, description = "Files processed", body = ApiResponse<BatchSummary>),
        (status = 400, description = "Invalid request, identifier or too many files"),
        (status = 408, description = "Transcode timed out"),
        (status = 409, description = "Job cancelled or job id already in use"),
        (status = 413, description = "File too large"),
        (status = 415, description = "Unsupported file format"),
        (status = 422, description = "Encoder failed"),
        (status = 503, description = "No free job slot or encoder unavailable")
    ),
    tag = "Compress"
)]
pub async fn upload_files(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    if let Err(e) = query.validate() {
        return AppError::InvalidIdentifier(e.to_string()).into_response();
    }

    let response = match receive_batch(&state, query.job_id.as_deref(), &mut multipart).await {
        Ok(summary) => {
            let message = format!(
                "Processed {} file(s): {} succeeded, {} failed",
                summary.total_files, summary.successful, summary.failed
            );
            ApiSuccess(ApiResponse::success(summary, &message), StatusCode::OK).into_response()
        }
        Err(e) => e.into_response(),
    };

    CompressService::spawn_sweep(state);
    response
}

async fn receive_batch(
    state: &AppState,
    job_id: Option<&str>,
    multipart: &mut Multipart,
) -> Result<BatchSummary, AppError> {
    let mut batch = UploadBatch::new(state, job_id)?;
    CompressService::ensure_encoder(state).await?;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return Err(multipart_error(state, e)),
        };

        let name = field.name().unwrap_or_default().to_string();
        if name != "file" && name != "files" {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let declared_size = field
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok());

        let upload = field.map(|chunk| chunk.map_err(multipart_io_error));
        batch.add(&filename, declared_size, upload).await?;
    }

    batch.finish()
}

fn multipart_error(state: &AppState, e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::FileTooLarge {
            limit_mb: state.config.max_file_size_mb(),
        }
    } else {
        warn!("Malformed multipart body: {}", e.body_text());
        AppError::InvalidRequest(e.body_text())
    }
}

fn multipart_io_error(e: MultipartError) -> io::Error {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        io::Error::new(io::ErrorKind::FileTooLarge, e.body_text())
    } else {
        io::Error::other(e.body_text())
    }
}

/// Coarse progress of a job
#[utoipa::path(
    get,
    path = "/api/v1/progress",
    params(ProgressQuery),
    responses(
        (status = 200, description = "Progress percentage (0, 80 or 100)", body = ApiResponse<ProgressResponse>),
        (status = 400, description = "Missing or invalid job id")
    ),
    tag = "Compress"
)]
pub async fn get_progress(
    State(state): State<AppState>,
    Query(query): Query<ProgressQuery>,
) -> impl IntoResponse {
    if let Err(e) = query.validate() {
        return AppError::InvalidIdentifier(e.to_string()).into_response();
    }
    let Some(job_id) = query.job_id else {
        return AppError::InvalidRequest("job_id is required".to_string()).into_response();
    };

    match CompressService::progress(&state, &job_id).await {
        Ok(progress) => ApiSuccess(
            ApiResponse::success(progress, "Progress retrieved successfully"),
            StatusCode::OK,
        )
        .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Download a compressed file
#[utoipa::path(
    get,
    path = "/api/v1/download/{filename}",
    params(
        ("filename" = String, Path, description = "Compressed file name returned by the upload")
    ),
    responses(
        (status = 200, description = "File contents", content_type = "application/octet-stream"),
        (status = 400, description = "Invalid file name"),
        (status = 404, description = "File not found or expired")
    ),
    tag = "Compress"
)]
pub async fn download_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> impl IntoResponse {
    let download = match CompressService::open_download(&state, &filename).await {
        Ok(download) => download,
        Err(e) => return e.into_response(),
    };

    let content_type = mime_guess::from_path(&download.filename).first_or_octet_stream();
    let disposition = format!(
        "attachment; filename=\"{}\"",
        download.filename.replace('"', "_")
    );
    let headers = [
        (header::CONTENT_TYPE, content_type.to_string()),
        (header::CONTENT_LENGTH, download.len.to_string()),
        (header::CONTENT_DISPOSITION, disposition),
        (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate".to_string()),
        (header::PRAGMA, "no-cache".to_string()),
        (header::EXPIRES, "0".to_string()),
    ];

    let body = Body::from_stream(ReaderStream::new(download.file));
    (StatusCode::OK, headers, body).into_response()
}

/// Cancel an in-flight job
#[utoipa::path(
    delete,
    path = "/api/v1/jobs/{job_id}",
    params(
        ("job_id" = String, Path, description = "Job id")
    ),
    responses(
        (status = 200, description = "Cancellation requested", body = ApiResponse<CancelResponse>),
        (status = 400, description = "Invalid job id"),
        (status = 404, description = "No such active job")
    ),
    tag = "Compress"
)]
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    match CompressService::cancel(&state, &job_id) {
        Ok(res) => ApiSuccess(
            ApiResponse::success(res, "Cancellation requested"),
            StatusCode::OK,
        )
        .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Service liveness and encoder availability
#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses(
        (status = 200, description = "Service health", body = ApiResponse<HealthResponse>)
    ),
    tag = "System"
)]
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let health = CompressService::health(&state).await;
    ApiSuccess(ApiResponse::success(health, "Service is running"), StatusCode::OK)
}

/// Limits, supported formats and current load
#[utoipa::path(
    get,
    path = "/api/v1/status",
    responses(
        (status = 200, description = "Service status", body = ApiResponse<StatusResponse>)
    ),
    tag = "System"
)]
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let status = CompressService::status(&state).await;
    ApiSuccess(ApiResponse::success(status, "Status retrieved successfully"), StatusCode::OK)
}
