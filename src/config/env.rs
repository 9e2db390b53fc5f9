use std::env;
use std::str::FromStr;

pub enum EnvKey {
    ServerPort,
    UploadDir,
    OutputDir,
    FfmpegPath,
    MaxConcurrentJobs,
    SlotWaitSecs,
    MaxFileSizeMb,
    MaxFilesPerRequest,
    TranscodeTimeoutSecs,
    FileTtlSecs,
    SweepIntervalSecs,
    CorsAllowedOrigins,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::ServerPort => "APP_PORT",
            EnvKey::UploadDir => "UPLOAD_DIR",
            EnvKey::OutputDir => "OUTPUT_DIR",
            EnvKey::FfmpegPath => "FFMPEG_PATH",
            EnvKey::MaxConcurrentJobs => "MAX_CONCURRENT_JOBS",
            EnvKey::SlotWaitSecs => "SLOT_WAIT_SECS",
            EnvKey::MaxFileSizeMb => "MAX_FILE_SIZE_MB",
            EnvKey::MaxFilesPerRequest => "MAX_FILES_PER_REQUEST",
            EnvKey::TranscodeTimeoutSecs => "TRANSCODE_TIMEOUT_SECS",
            EnvKey::FileTtlSecs => "FILE_TTL_SECS",
            EnvKey::SweepIntervalSecs => "SWEEP_INTERVAL_SECS",
            EnvKey::CorsAllowedOrigins => "CORS_ALLOWED_ORIGINS",
        }
    }
}

pub fn get(key: EnvKey) -> Result<String, env::VarError> {
    env::var(key.as_str())
}

pub fn get_or(key: EnvKey, default: &str) -> String {
    env::var(key.as_str()).unwrap_or_else(|_| default.to_string())
}

pub fn get_parsed<T: FromStr>(key: EnvKey, default: T) -> T {
    match get(key) {
        Ok(val) => val.trim().parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}
