//! Error taxonomy shared by the pipeline and the HTTP layer.
//!
//! Validation failures are produced before any slot or disk space is taken.
//! Everything that goes wrong while a job runs is translated into one of
//! these variants at the orchestrator boundary.

use crate::common::response::ApiResponse;
use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

/// Longest encoder diagnostic passed back to a client.
const MAX_DETAIL_CHARS: usize = 500;

/// Seconds a client is told to wait after an `Overloaded` rejection.
const RETRY_AFTER_SECS: &str = "5";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("File exceeds the maximum size of {limit_mb} MB")]
    FileTooLarge { limit_mb: u64 },

    #[error("At most {0} files can be uploaded per request")]
    TooManyFiles(usize),

    #[error("No file was provided")]
    NoFile,

    #[error("Malformed request: {0}")]
    InvalidRequest(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Encoder is not installed or not available")]
    EncoderUnavailable,

    #[error("Encoder failed (exit code {}): {detail}", display_exit_code(.exit_code))]
    EncoderFailed {
        exit_code: Option<i32>,
        detail: String,
    },

    #[error("Processing timed out after {0} seconds, the file may be too large")]
    Timeout(u64),

    #[error("Job was cancelled")]
    Cancelled,

    #[error("Job id {0} is already being processed")]
    JobConflict(String),

    #[error("Server is busy, try again later")]
    Overloaded,

    #[error("File not found or expired")]
    NotFound,

    #[error("Internal server error, please try again later")]
    Internal(#[source] anyhow::Error),
}

impl AppError {
    pub fn encoder_failed(exit_code: Option<i32>, stderr: &str) -> Self {
        AppError::EncoderFailed {
            exit_code,
            detail: truncate_tail(stderr.trim(), MAX_DETAIL_CHARS),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::TooManyFiles(_)
            | AppError::NoFile
            | AppError::InvalidRequest(_)
            | AppError::InvalidIdentifier(_) => StatusCode::BAD_REQUEST,
            AppError::EncoderUnavailable | AppError::Overloaded => StatusCode::SERVICE_UNAVAILABLE,
            AppError::EncoderFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            AppError::Cancelled | AppError::JobConflict(_) => StatusCode::CONFLICT,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::UnsupportedFormat(_) => "unsupported_format",
            AppError::FileTooLarge { .. } => "file_too_large",
            AppError::TooManyFiles(_) => "too_many_files",
            AppError::NoFile => "no_file",
            AppError::InvalidRequest(_) => "invalid_request",
            AppError::InvalidIdentifier(_) => "invalid_identifier",
            AppError::EncoderUnavailable => "encoder_unavailable",
            AppError::EncoderFailed { .. } => "encoder_failed",
            AppError::Timeout(_) => "timeout",
            AppError::Cancelled => "cancelled",
            AppError::JobConflict(_) => "job_conflict",
            AppError::Overloaded => "overloaded",
            AppError::NotFound => "not_found",
            AppError::Internal(_) => "internal_error",
        }
    }

    /// Errors that end a whole upload request instead of a single file.
    pub fn aborts_batch(&self) -> bool {
        matches!(
            self,
            AppError::TooManyFiles(_)
                | AppError::Overloaded
                | AppError::JobConflict(_)
                | AppError::EncoderUnavailable
        )
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Internal(e.into())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        AppError::Internal(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if let AppError::Internal(source) = &self {
            error!(error = ?source, "Internal error while handling request");
        }

        let body = ApiResponse::<()>::error(&self.to_string(), self.code());
        let mut response = (status, Json(body)).into_response();

        if matches!(self, AppError::Overloaded) {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECS));
        }

        response
    }
}

fn display_exit_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

/// Keeps the last `max` characters; encoder errors are reported at the end.
fn truncate_tail(text: &str, max: usize) -> String {
    let count = text.chars().count();
    if count <= max {
        return text.to_string();
    }
    let tail: String = text.chars().skip(count - max).collect();
    format!("...{tail}")
}
