use crate::config::env::{self, EnvKey};
use std::path::PathBuf;
use std::time::Duration;

const MIB: u64 = 1024 * 1024;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_port: u16,
    pub upload_dir: PathBuf,
    pub output_dir: PathBuf,
    pub ffmpeg_path: PathBuf,
    pub max_concurrent_jobs: usize,
    /// How long an upload may wait for a free job slot. Zero rejects at once.
    pub slot_wait: Duration,
    pub max_file_size: u64,
    pub max_files_per_request: usize,
    pub transcode_timeout: Duration,
    pub file_ttl: Duration,
    pub sweep_interval: Duration,
    pub allowed_origins: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let tmp = std::env::temp_dir();
        Self {
            server_port: 8000,
            upload_dir: tmp.join("video_compress_uploads"),
            output_dir: tmp.join("video_compress_outputs"),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            max_concurrent_jobs: 3,
            slot_wait: Duration::from_secs(10),
            max_file_size: 50 * MIB,
            max_files_per_request: 5,
            transcode_timeout: Duration::from_secs(280),
            file_ttl: Duration::from_secs(60 * 60),
            sweep_interval: Duration::from_secs(10 * 60),
            allowed_origins: vec!["*".to_string()],
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let upload_dir = env::get(EnvKey::UploadDir)
            .map(PathBuf::from)
            .unwrap_or(defaults.upload_dir);
        let output_dir = env::get(EnvKey::OutputDir)
            .map(PathBuf::from)
            .unwrap_or(defaults.output_dir);

        let allowed_origins = env::get_or(EnvKey::CorsAllowedOrigins, "*")
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        Self {
            server_port: env::get_parsed(EnvKey::ServerPort, defaults.server_port),
            upload_dir,
            output_dir,
            ffmpeg_path: PathBuf::from(env::get_or(EnvKey::FfmpegPath, "ffmpeg")),
            // A zero-permit limiter would never admit anything.
            max_concurrent_jobs: env::get_parsed(EnvKey::MaxConcurrentJobs, 3usize).max(1),
            slot_wait: Duration::from_secs(env::get_parsed(EnvKey::SlotWaitSecs, 10u64)),
            max_file_size: mebibytes(env::get_parsed(EnvKey::MaxFileSizeMb, 50u64)),
            max_files_per_request: env::get_parsed(EnvKey::MaxFilesPerRequest, 5usize).max(1),
            transcode_timeout: Duration::from_secs(env::get_parsed(
                EnvKey::TranscodeTimeoutSecs,
                280u64,
            )),
            file_ttl: Duration::from_secs(env::get_parsed(EnvKey::FileTtlSecs, 3600u64)),
            sweep_interval: Duration::from_secs(
                env::get_parsed(EnvKey::SweepIntervalSecs, 600u64).max(1),
            ),
            allowed_origins,
        }
    }

    pub fn max_file_size_mb(&self) -> u64 {
        self.max_file_size / MIB
    }

    /// Upper bound for a whole multipart request body.
    pub fn max_request_body(&self) -> usize {
        let files = self.max_files_per_request as u64;
        usize::try_from(self.max_file_size.saturating_mul(files).saturating_add(MIB))
            .unwrap_or(usize::MAX)
    }
}

/// Size limit in bytes. Absurd settings clamp instead of overflowing.
fn mebibytes(mb: u64) -> u64 {
    mb.saturating_mul(MIB)
}
