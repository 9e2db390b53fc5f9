use crate::modules::compress::service::CompressService;
use crate::state::AppState;
use tokio::time::{self, MissedTickBehavior};
use tracing::info;

/// Deletes expired scratch files every `sweep_interval` for the life of the
/// process.
pub async fn start_sweeper_worker(state: AppState) {
    let period = state.config.sweep_interval;
    info!(
        every_secs = period.as_secs(),
        ttl_secs = state.config.file_ttl.as_secs(),
        "🧹 Starting scratch sweeper..."
    );

    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires at once; startup already swept.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        CompressService::sweep(&state).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::AppConfig;
    use std::fs::File;
    use std::time::{Duration, SystemTime};

    #[tokio::test]
    async fn sweeper_removes_expired_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            upload_dir: dir.path().join("uploads"),
            output_dir: dir.path().join("outputs"),
            file_ttl: Duration::from_secs(60),
            sweep_interval: Duration::from_millis(50),
            ..AppConfig::default()
        };
        let state = AppState::new(config).await.unwrap();

        let stale = state.store.output_dir().join("old_compressed.mp4");
        std::fs::write(&stale, b"x").unwrap();
        File::options()
            .write(true)
            .open(&stale)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(600))
            .unwrap();

        let worker = tokio::spawn(start_sweeper_worker(state));
        tokio::time::sleep(Duration::from_millis(300)).await;
        worker.abort();

        assert!(!stale.exists());
    }
}
