#![allow(dead_code)]

use bytes::Bytes;
use futures_util::stream;
use mediashrink::config::settings::AppConfig;
use mediashrink::state::AppState;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

pub const MIB: usize = 1024 * 1024;

pub type Upload = stream::Iter<std::vec::IntoIter<io::Result<Bytes>>>;

pub fn fake_ffmpeg() -> PathBuf {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/fake_ffmpeg.sh");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

pub fn test_config(dir: &Path) -> AppConfig {
    AppConfig {
        upload_dir: dir.join("uploads"),
        output_dir: dir.join("outputs"),
        ffmpeg_path: fake_ffmpeg(),
        slot_wait: Duration::from_secs(2),
        transcode_timeout: Duration::from_secs(10),
        ..AppConfig::default()
    }
}

pub async fn test_state(config: AppConfig) -> AppState {
    AppState::new(config).await.unwrap()
}

/// `data` as a chunked upload body.
pub fn upload(data: &[u8]) -> Upload {
    let chunks: Vec<io::Result<Bytes>> = data
        .chunks(64 * 1024)
        .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
        .collect();
    stream::iter(chunks)
}

pub fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Pid the encoder stand-in recorded in a job's progress sidecar.
pub async fn encoder_pid(sidecar: &Path) -> String {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if let Ok(text) = std::fs::read_to_string(sidecar) {
            if let Some(pid) = text.lines().find_map(|line| line.strip_prefix("pid=")) {
                return pid.to_string();
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("no encoder pid in {}", sidecar.display());
}

pub fn process_alive(pid: &str) -> bool {
    std::process::Command::new("sh")
        .arg("-c")
        .arg(format!("kill -0 {pid} 2>/dev/null"))
        .status()
        .unwrap()
        .success()
}

/// Polls the registry until `job_id` reaches `state` or five seconds pass.
pub async fn wait_for_state(app: &AppState, job_id: &str, state: &str) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if app.jobs.find(job_id).is_some_and(|job| job.state.as_str() == state) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("job {job_id} never reached {state}");
}
