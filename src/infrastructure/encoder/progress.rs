use std::io;
use std::path::Path;
use tracing::debug;

pub const PROGRESS_NONE: u8 = 0;
pub const PROGRESS_RUNNING: u8 = 80;
pub const PROGRESS_DONE: u8 = 100;

/// Coarse progress of a job from its ffmpeg `-progress` sidecar.
///
/// A missing sidecar reads as finished. It is also what a job that has not
/// started yet looks like; callers cannot tell the two apart.
pub async fn read_progress(sidecar: &Path) -> u8 {
    match tokio::fs::read(sidecar).await {
        Ok(bytes) => match std::str::from_utf8(&bytes) {
            Ok(text) => parse_progress(text),
            Err(e) => {
                debug!(path = %sidecar.display(), error = %e, "Progress sidecar is not text");
                PROGRESS_NONE
            }
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => PROGRESS_DONE,
        Err(e) => {
            debug!(path = %sidecar.display(), error = %e, "Failed to read progress sidecar");
            PROGRESS_NONE
        }
    }
}

pub fn parse_progress(text: &str) -> u8 {
    let mut running = false;

    for line in text.lines().map(str::trim) {
        if line == "progress=end" {
            return PROGRESS_DONE;
        }
        if line.starts_with("out_time") {
            running = true;
        }
    }

    if running { PROGRESS_RUNNING } else { PROGRESS_NONE }
}
