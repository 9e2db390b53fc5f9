use crate::common::media::MediaKind;
use crate::infrastructure::storage::scratch::JobPaths;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

pub const MAX_JOB_ID_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Admitted,
    Running,
    Succeeded,
    Failed(String),
    TimedOut,
    Cancelled,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Admitted => "admitted",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed(_) => "failed",
            JobState::TimedOut => "timed_out",
            JobState::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub kind: MediaKind,
    pub original_filename: String,
    pub paths: JobPaths,
    pub created_at: OffsetDateTime,
    pub state: JobState,
    pub cancel: CancellationToken,
}

impl Job {
    pub fn new(id: &str, kind: MediaKind, original_filename: &str, paths: JobPaths) -> Self {
        Self {
            id: id.to_string(),
            kind,
            original_filename: original_filename.to_string(),
            paths,
            created_at: OffsetDateTime::now_utc(),
            state: JobState::Admitted,
            cancel: CancellationToken::new(),
        }
    }
}

/// Job ids are 1 to 64 characters of `[A-Za-z0-9_-]`.
pub fn is_valid_job_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_JOB_ID_LEN
        && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

pub fn generate_job_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Id of the `position`-th file (1-based) of a request carrying `base`.
pub fn batch_job_id(base: &str, position: usize) -> String {
    if position <= 1 {
        base.to_string()
    } else {
        format!("{base}-{position}")
    }
}
