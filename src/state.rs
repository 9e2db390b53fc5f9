use crate::config::settings::AppConfig;
use crate::infrastructure::encoder::ffmpeg::FfmpegRunner;
use crate::infrastructure::queue::limiter::SlotLimiter;
use crate::infrastructure::storage::scratch::ScratchStore;
use crate::modules::compress::repository::JobRepository;
use anyhow::Context;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: ScratchStore,
    pub limiter: SlotLimiter,
    pub encoder: FfmpegRunner,
    pub jobs: JobRepository,
}

impl AppState {
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let store = ScratchStore::new(config.upload_dir.clone(), config.output_dir.clone());
        store
            .init()
            .await
            .context("failed to create scratch directories")?;

        Ok(Self {
            limiter: SlotLimiter::new(config.max_concurrent_jobs, config.slot_wait),
            encoder: FfmpegRunner::new(config.ffmpeg_path.clone()),
            jobs: JobRepository::new(),
            store,
            config,
        })
    }
}
