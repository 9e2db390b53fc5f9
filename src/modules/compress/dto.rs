use super::model::{Job, MAX_JOB_ID_LEN, is_valid_job_id};
use crate::common::error::AppError;
use crate::common::media::MediaKind;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidationError};

/// Longest caller job id on upload. Leaves room for the `-{n}` suffix of
/// later files in a batch.
pub const MAX_UPLOAD_JOB_ID_LEN: usize = MAX_JOB_ID_LEN - 8;

/// `validator` takes `u64` lengths.
const MAX_UPLOAD_JOB_ID_LEN_U64: u64 = MAX_UPLOAD_JOB_ID_LEN as u64;

#[derive(Debug, Default, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UploadQuery {
    /// Id to poll progress with. Generated when absent.
    #[validate(
        length(min = 1, max = MAX_UPLOAD_JOB_ID_LEN_U64, message = "job_id is too long"),
        custom(function = "validate_job_id")
    )]
    pub job_id: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProgressQuery {
    #[serde(alias = "task_id")]
    #[validate(custom(function = "validate_job_id"))]
    pub job_id: Option<String>,
}

fn validate_job_id(id: &str) -> Result<(), ValidationError> {
    if is_valid_job_id(id) {
        Ok(())
    } else {
        Err(ValidationError::new("job_id")
            .with_message("job_id may only contain letters, digits, '-' and '_'".into()))
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CompressedFile {
    pub job_id: String,
    pub original_filename: String,
    pub media_type: MediaKind,
    pub compressed_filename: String,
    pub download_url: String,
    pub original_size: u64,
    pub compressed_size: u64,
    /// Size reduction in percent, two decimals.
    pub compression_ratio: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FileResult {
    pub filename: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<CompressedFile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl FileResult {
    pub fn from_outcome(filename: String, outcome: Result<CompressedFile, AppError>) -> Self {
        match outcome {
            Ok(file) => Self {
                filename,
                success: true,
                result: Some(file),
                error: None,
                code: None,
            },
            Err(e) => Self {
                filename,
                success: false,
                result: None,
                error: Some(e.to_string()),
                code: Some(e.code().to_string()),
            },
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BatchSummary {
    pub results: Vec<FileResult>,
    pub total_files: usize,
    pub successful: usize,
    pub failed: usize,
}

impl From<Vec<FileResult>> for BatchSummary {
    fn from(results: Vec<FileResult>) -> Self {
        let successful = results.iter().filter(|r| r.success).count();
        Self {
            total_files: results.len(),
            successful,
            failed: results.len() - successful,
            results,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProgressResponse {
    pub job_id: String,
    /// 0 not started, 80 encoding, 100 finished or unknown.
    pub progress: u8,
    /// Present while the job is admitted or running.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CancelResponse {
    pub job_id: String,
    pub cancelled: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub encoder_available: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ActiveJob {
    pub job_id: String,
    pub media_type: MediaKind,
    pub original_filename: String,
    pub state: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<Job> for ActiveJob {
    fn from(job: Job) -> Self {
        Self {
            state: job.state.as_str().to_string(),
            job_id: job.id,
            media_type: job.kind,
            original_filename: job.original_filename,
            created_at: job.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    pub encoder_available: bool,
    pub active_jobs: usize,
    pub busy_slots: usize,
    pub max_concurrent_jobs: usize,
    pub max_file_size_mb: u64,
    pub max_files_per_request: usize,
    pub transcode_timeout_secs: u64,
    pub supported_video_formats: Vec<String>,
    pub supported_audio_formats: Vec<String>,
    pub jobs: Vec<ActiveJob>,
}
