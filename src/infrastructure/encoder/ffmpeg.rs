//! Supervised ffmpeg invocations.
//!
//! Every run ends in an [`Outcome`]. Only an I/O failure while spawning or
//! waiting on the child is reported as an error.

use crate::common::media::MediaKind;
use crate::infrastructure::storage::scratch::JobPaths;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Bytes of encoder stderr kept for error reports.
const STDERR_TAIL_BYTES: usize = 4096;

const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// How long to wait for the stderr reader after the child has exited.
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    Failed {
        exit_code: Option<i32>,
        stderr: String,
    },
    TimedOut,
    Cancelled,
    EncoderMissing,
}

enum Finish {
    Exited(io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

#[derive(Clone, Debug)]
pub struct FfmpegRunner {
    program: PathBuf,
}

impl FfmpegRunner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Argument vector for one job. Progress goes to the `progress` sidecar.
    #[rustfmt::skip]
    pub fn build_args(
        kind: MediaKind,
        input: &Path,
        output: &Path,
        progress: &Path,
    ) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-y".into(), "-i".into(), input.into()];

        match kind {
            MediaKind::Video => args.extend(
                [
                    "-vf", "scale=-2:480",
                    "-c:v", "libx264",
                    "-preset", "veryfast",
                    "-crf", "32",
                    "-c:a", "aac",
                    "-b:a", "64k",
                    "-movflags", "+faststart",
                ]
                .map(OsString::from),
            ),
            // The mp3 muxer only takes mp3 streams.
            MediaKind::Audio => args.extend(
                [
                    "-vn",
                    "-ar", "44100",
                    "-ac", "2",
                    "-c:a", "libmp3lame",
                    "-b:a", "64k",
                ]
                .map(OsString::from),
            ),
        }

        args.push("-progress".into());
        args.push(progress.into());
        args.push("-nostats".into());
        args.push(output.into());
        args
    }

    pub async fn run(
        &self,
        kind: MediaKind,
        paths: &JobPaths,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> io::Result<Outcome> {
        let args = Self::build_args(kind, &paths.input, &paths.output, &paths.progress);

        let mut cmd = Command::new(&self.program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(program = %self.program.display(), "❌ Encoder binary not found");
                return Ok(Outcome::EncoderMissing);
            }
            Err(e) => return Err(e),
        };

        debug!(
            pid = ?child.id(),
            kind = kind.as_str(),
            input = %paths.input.display(),
            "Encoder started"
        );

        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(read_tail(stderr, STDERR_TAIL_BYTES)));

        let finish = tokio::select! {
            status = child.wait() => Finish::Exited(status),
            _ = tokio::time::sleep(timeout) => Finish::TimedOut,
            _ = cancel.cancelled() => Finish::Cancelled,
        };

        match finish {
            Finish::Exited(status) => {
                let status = status?;
                let stderr = collect_tail(stderr_task).await;

                if status.success() {
                    Ok(Outcome::Succeeded)
                } else {
                    debug!(code = ?status.code(), "Encoder exited with failure");
                    Ok(Outcome::Failed {
                        exit_code: status.code(),
                        stderr,
                    })
                }
            }
            Finish::TimedOut => {
                warn!(timeout_secs = timeout.as_secs(), "⏱️ Encoder timed out, killing it");
                terminate(&mut child, stderr_task).await;
                Ok(Outcome::TimedOut)
            }
            Finish::Cancelled => {
                info!("🛑 Encoder run cancelled");
                terminate(&mut child, stderr_task).await;
                Ok(Outcome::Cancelled)
            }
        }
    }

    /// Runs `<program> -version`, bounded to a few seconds.
    pub async fn is_available(&self) -> bool {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        match tokio::time::timeout(VERSION_PROBE_TIMEOUT, cmd.status()).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(e)) => {
                debug!(program = %self.program.display(), error = %e, "Encoder probe failed");
                false
            }
            Err(_) => {
                warn!(program = %self.program.display(), "Encoder probe timed out");
                false
            }
        }
    }
}

async fn terminate(child: &mut Child, stderr_task: Option<JoinHandle<String>>) {
    if let Err(e) = child.start_kill() {
        debug!(error = %e, "Kill signal not delivered");
    }
    if let Err(e) = child.wait().await {
        warn!(error = %e, "Failed to reap encoder process");
    }
    if let Some(task) = stderr_task {
        task.abort();
    }
}

async fn collect_tail(task: Option<JoinHandle<String>>) -> String {
    let Some(task) = task else {
        return String::new();
    };

    match tokio::time::timeout(STDERR_DRAIN_TIMEOUT, task).await {
        Ok(Ok(tail)) => tail,
        Ok(Err(e)) => {
            debug!(error = %e, "Stderr reader task failed");
            String::new()
        }
        Err(_) => String::new(),
    }
}

/// Reads `reader` to the end, keeping only the last `max` bytes.
async fn read_tail<R>(mut reader: R, max: usize) -> String
where
    R: AsyncRead + Unpin,
{
    let mut tail: Vec<u8> = Vec::with_capacity(max);
    let mut buf = [0u8; 1024];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                tail.extend_from_slice(&buf[..n]);
                if tail.len() > max {
                    let excess = tail.len() - max;
                    tail.drain(..excess);
                }
            }
        }
    }

    String::from_utf8_lossy(&tail).into_owned()
}
