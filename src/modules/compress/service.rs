use super::dto::{
    ActiveJob, BatchSummary, CancelResponse, CompressedFile, FileResult, HealthResponse,
    MAX_UPLOAD_JOB_ID_LEN, ProgressResponse, StatusResponse,
};
use super::model::{Job, JobState, batch_job_id, generate_job_id, is_valid_job_id};
use super::repository::JobHandle;
use crate::common::error::AppError;
use crate::common::media::{self, AUDIO_EXTENSIONS, MediaKind, VIDEO_EXTENSIONS};
use crate::common::upload::{UploadError, stream_to_disk};
use crate::infrastructure::encoder::ffmpeg::Outcome;
use crate::infrastructure::encoder::progress::read_progress;
use crate::infrastructure::queue::limiter::SlotPermit;
use crate::infrastructure::storage::scratch::{JobScratch, SweepReport};
use crate::state::AppState;
use anyhow::Context;
use bytes::Bytes;
use futures_util::Stream;
use std::io;
use time::OffsetDateTime;
use tokio::fs::File;
use tracing::{info, warn};

pub const SERVICE_NAME: &str = "mediashrink";

pub struct CompressService;

/// An opened output file ready to be streamed to a client.
#[derive(Debug)]
pub struct DownloadFile {
    pub file: File,
    pub len: u64,
    pub filename: String,
}

impl CompressService {
    /// Compresses a single upload under its own job slot.
    pub async fn process<S>(
        state: &AppState,
        filename: &str,
        declared_size: Option<u64>,
        job_id: Option<&str>,
        upload: S,
    ) -> Result<CompressedFile, AppError>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        let kind = Self::validate_file(state, filename, declared_size)?;
        let job_id = Self::resolve_job_id(job_id)?;
        Self::ensure_encoder(state).await?;
        let _permit = Self::acquire_slot(state).await?;

        Self::run_job(state, &job_id, kind, filename, upload).await
    }

    /// Checks everything that can be known about a file before it is stored.
    pub fn validate_file(
        state: &AppState,
        filename: &str,
        declared_size: Option<u64>,
    ) -> Result<MediaKind, AppError> {
        let kind = MediaKind::from_filename(filename)
            .ok_or_else(|| AppError::UnsupportedFormat(filename.to_string()))?;

        if !media::is_safe_filename(filename) {
            return Err(AppError::InvalidIdentifier(filename.to_string()));
        }

        if declared_size.is_some_and(|size| size > state.config.max_file_size) {
            return Err(AppError::FileTooLarge {
                limit_mb: state.config.max_file_size_mb(),
            });
        }

        Ok(kind)
    }

    pub fn resolve_job_id(job_id: Option<&str>) -> Result<String, AppError> {
        match job_id {
            Some(id) if is_valid_job_id(id) => Ok(id.to_string()),
            Some(id) => Err(AppError::InvalidIdentifier(id.to_string())),
            None => Ok(generate_job_id()),
        }
    }

    /// Refuses work up front when the encoder cannot be started.
    pub async fn ensure_encoder(state: &AppState) -> Result<(), AppError> {
        if state.encoder.is_available().await {
            return Ok(());
        }
        warn!(
            program = %state.encoder.program().display(),
            "⚠️ Upload rejected: encoder unavailable"
        );
        Err(AppError::EncoderUnavailable)
    }

    async fn acquire_slot(state: &AppState) -> Result<SlotPermit, AppError> {
        state.limiter.acquire().await.map_err(|e| {
            warn!(busy = state.limiter.in_flight(), "⚠️ Upload rejected: {}", e);
            AppError::Overloaded
        })
    }

    /// Runs one job while the caller holds a slot. Scratch files are purged
    /// and the job deregistered on every path out.
    async fn run_job<S>(
        state: &AppState,
        job_id: &str,
        kind: MediaKind,
        filename: &str,
        upload: S,
    ) -> Result<CompressedFile, AppError>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        let extension = media::extension(filename).unwrap_or(kind.output_extension());
        let paths = state.store.prepare(job_id, extension, kind);
        let handle = state
            .jobs
            .register(Job::new(job_id, kind, filename, paths.clone()))?;
        let mut scratch = JobScratch::new(paths);

        info!(job_id, kind = kind.as_str(), filename, "📥 Job admitted");

        let result = Self::execute(state, &handle, &mut scratch, kind, filename, upload).await;
        scratch.purge().await;

        match &result {
            Ok(file) => info!(
                job_id,
                original_size = file.original_size,
                compressed_size = file.compressed_size,
                ratio = file.compression_ratio,
                "✅ Job finished"
            ),
            Err(e) => warn!(job_id, code = e.code(), "❌ Job failed: {}", e),
        }
        result
    }

    async fn execute<S>(
        state: &AppState,
        handle: &JobHandle,
        scratch: &mut JobScratch,
        kind: MediaKind,
        filename: &str,
        upload: S,
    ) -> Result<CompressedFile, AppError>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        let paths = scratch.paths().clone();

        let original_size = stream_to_disk(upload, &paths.input, state.config.max_file_size)
            .await
            .map_err(|e| Self::upload_error(state, e))?;

        if handle.cancel_token().is_cancelled() {
            handle.set_state(JobState::Cancelled);
            return Err(AppError::Cancelled);
        }

        handle.set_state(JobState::Running);
        scratch.mark_encoder_started();
        let outcome = state
            .encoder
            .run(kind, &paths, state.config.transcode_timeout, handle.cancel_token())
            .await
            .context("failed to supervise the encoder process")?;

        match outcome {
            Outcome::Succeeded => {
                let compressed_size = tokio::fs::metadata(&paths.output)
                    .await
                    .context("encoder reported success but left no output")?
                    .len();
                scratch.keep_output();
                handle.set_state(JobState::Succeeded);

                let compressed_filename = paths.output_name();
                Ok(CompressedFile {
                    job_id: handle.id().to_string(),
                    original_filename: filename.to_string(),
                    media_type: kind,
                    download_url: format!("/api/v1/download/{compressed_filename}"),
                    compressed_filename,
                    original_size,
                    compressed_size,
                    compression_ratio: compression_ratio(original_size, compressed_size),
                })
            }
            Outcome::Failed { exit_code, stderr } => {
                handle.set_state(JobState::Failed(format!("exit code {exit_code:?}")));
                Err(AppError::encoder_failed(exit_code, &stderr))
            }
            Outcome::TimedOut => {
                handle.set_state(JobState::TimedOut);
                Err(AppError::Timeout(state.config.transcode_timeout.as_secs()))
            }
            Outcome::Cancelled => {
                handle.set_state(JobState::Cancelled);
                Err(AppError::Cancelled)
            }
            Outcome::EncoderMissing => {
                // Nothing was spawned, so an output under this id predates the job.
                scratch.keep_output();
                handle.set_state(JobState::Failed("encoder missing".to_string()));
                Err(AppError::EncoderUnavailable)
            }
        }
    }

    fn upload_error(state: &AppState, err: UploadError) -> AppError {
        let too_large = AppError::FileTooLarge {
            limit_mb: state.config.max_file_size_mb(),
        };

        match err {
            UploadError::TooLarge { .. } => too_large,
            UploadError::Stream(e) if e.kind() == io::ErrorKind::FileTooLarge => too_large,
            UploadError::Stream(e) => AppError::InvalidRequest(format!("upload interrupted: {e}")),
            UploadError::Io(e) => {
                AppError::Internal(anyhow::Error::new(e).context("failed to store upload"))
            }
        }
    }

    pub async fn progress(state: &AppState, job_id: &str) -> Result<ProgressResponse, AppError> {
        if !is_valid_job_id(job_id) {
            return Err(AppError::InvalidIdentifier(job_id.to_string()));
        }

        let progress = read_progress(&state.store.progress_path(job_id)).await;
        let job_state = state
            .jobs
            .find(job_id)
            .map(|job| job.state.as_str().to_string());

        Ok(ProgressResponse {
            job_id: job_id.to_string(),
            progress,
            state: job_state,
        })
    }

    pub async fn open_download(state: &AppState, filename: &str) -> Result<DownloadFile, AppError> {
        let path = state
            .store
            .output_file(filename)
            .ok_or_else(|| AppError::InvalidIdentifier(filename.to_string()))?;

        let file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(AppError::NotFound),
            Err(e) => return Err(e.into()),
        };

        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(AppError::NotFound);
        }

        Ok(DownloadFile {
            file,
            len: metadata.len(),
            filename: filename.to_string(),
        })
    }

    pub fn cancel(state: &AppState, job_id: &str) -> Result<CancelResponse, AppError> {
        if !is_valid_job_id(job_id) {
            return Err(AppError::InvalidIdentifier(job_id.to_string()));
        }

        if !state.jobs.cancel(job_id) {
            return Err(AppError::NotFound);
        }

        info!(job_id, "🛑 Cancellation requested");
        Ok(CancelResponse {
            job_id: job_id.to_string(),
            cancelled: true,
        })
    }

    pub async fn health(state: &AppState) -> HealthResponse {
        let encoder_available = state.encoder.is_available().await;

        HealthResponse {
            status: if encoder_available { "healthy" } else { "degraded" }.to_string(),
            service: SERVICE_NAME.to_string(),
            timestamp: OffsetDateTime::now_utc(),
            encoder_available,
        }
    }

    pub async fn status(state: &AppState) -> StatusResponse {
        let config = &state.config;

        StatusResponse {
            encoder_available: state.encoder.is_available().await,
            active_jobs: state.jobs.active_count(),
            busy_slots: state.limiter.in_flight(),
            max_concurrent_jobs: state.limiter.capacity(),
            max_file_size_mb: config.max_file_size_mb(),
            max_files_per_request: config.max_files_per_request,
            transcode_timeout_secs: config.transcode_timeout.as_secs(),
            supported_video_formats: VIDEO_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            supported_audio_formats: AUDIO_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            jobs: state.jobs.list().into_iter().map(ActiveJob::from).collect(),
        }
    }

    pub async fn sweep(state: &AppState) -> SweepReport {
        state.store.sweep(state.config.file_ttl).await
    }

    /// Runs a sweep without holding up the caller.
    pub fn spawn_sweep(state: AppState) {
        tokio::spawn(async move {
            Self::sweep(&state).await;
        });
    }
}

/// The files of one upload request.
///
/// A slot is taken for the first file that passes validation and held until
/// the batch is dropped, so a request never occupies more than one slot.
pub struct UploadBatch<'a> {
    state: &'a AppState,
    base_id: Option<String>,
    permit: Option<SlotPermit>,
    files: Vec<(String, Result<CompressedFile, AppError>)>,
}

impl<'a> UploadBatch<'a> {
    /// Later files get `{job_id}-{n}`, so a caller id is capped at
    /// [`MAX_UPLOAD_JOB_ID_LEN`] to keep those ids valid.
    pub fn new(state: &'a AppState, job_id: Option<&str>) -> Result<Self, AppError> {
        let base_id = match job_id {
            Some(id) if id.len() > MAX_UPLOAD_JOB_ID_LEN => {
                return Err(AppError::InvalidIdentifier(id.to_string()));
            }
            Some(id) => Some(CompressService::resolve_job_id(Some(id))?),
            None => None,
        };

        Ok(Self {
            state,
            base_id,
            permit: None,
            files: Vec::new(),
        })
    }

    /// Processes the next file. A failure of this file alone is recorded and
    /// `Ok` returned; only errors that end the whole request come back.
    pub async fn add<S>(
        &mut self,
        filename: &str,
        declared_size: Option<u64>,
        upload: S,
    ) -> Result<(), AppError>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        let position = self.files.len() + 1;
        let max_files = self.state.config.max_files_per_request;
        if position > max_files {
            return Err(AppError::TooManyFiles(max_files));
        }

        match self.process(position, filename, declared_size, upload).await {
            Err(e) if e.aborts_batch() => Err(e),
            outcome => {
                self.files.push((filename.to_string(), outcome));
                Ok(())
            }
        }
    }

    async fn process<S>(
        &mut self,
        position: usize,
        filename: &str,
        declared_size: Option<u64>,
        upload: S,
    ) -> Result<CompressedFile, AppError>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        let state = self.state;
        let kind = CompressService::validate_file(state, filename, declared_size)?;

        let job_id = match &self.base_id {
            Some(base) => batch_job_id(base, position),
            None => generate_job_id(),
        };

        if self.permit.is_none() {
            self.permit = Some(CompressService::acquire_slot(state).await?);
        }

        CompressService::run_job(state, &job_id, kind, filename, upload).await
    }

    /// Single-file requests surface that file's error directly.
    pub fn finish(mut self) -> Result<BatchSummary, AppError> {
        if self.files.is_empty() {
            return Err(AppError::NoFile);
        }

        if self.files.len() == 1 && self.files[0].1.is_err() {
            if let Some((_, Err(e))) = self.files.pop() {
                return Err(e);
            }
        }

        let results: Vec<FileResult> = self
            .files
            .into_iter()
            .map(|(filename, outcome)| FileResult::from_outcome(filename, outcome))
            .collect();
        Ok(BatchSummary::from(results))
    }
}

/// Percentage saved, rounded to two decimals. Negative if the output grew.
pub fn compression_ratio(original: u64, compressed: u64) -> f64 {
    if original == 0 {
        return 0.0;
    }
    let ratio = (1.0 - compressed as f64 / original as f64) * 100.0;
    (ratio * 100.0).round() / 100.0
}
