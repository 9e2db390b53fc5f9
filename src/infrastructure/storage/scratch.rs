//! Local scratch space for uploads, encoder sidecars and compressed outputs.

use crate::common::media::{MediaKind, is_safe_filename};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// Files touched by one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPaths {
    pub input: PathBuf,
    pub output: PathBuf,
    pub progress: PathBuf,
}

impl JobPaths {
    /// Name of the output file inside the output directory.
    pub fn output_name(&self) -> String {
        self.output
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub removed: usize,
    pub failed: usize,
}

#[derive(Clone, Debug)]
pub struct ScratchStore {
    upload_dir: PathBuf,
    output_dir: PathBuf,
}

impl ScratchStore {
    pub fn new(upload_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    pub async fn init(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.upload_dir).await?;
        tokio::fs::create_dir_all(&self.output_dir).await?;
        info!(
            uploads = %self.upload_dir.display(),
            outputs = %self.output_dir.display(),
            "✅ Scratch directories ready"
        );
        Ok(())
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Paths for `job_id`. `extension` is the upload's own extension.
    pub fn prepare(&self, job_id: &str, extension: &str, kind: MediaKind) -> JobPaths {
        JobPaths {
            input: self
                .upload_dir
                .join(format!("{job_id}.{}", extension.to_ascii_lowercase())),
            output: self
                .output_dir
                .join(format!("{job_id}_compressed.{}", kind.output_extension())),
            progress: self.progress_path(job_id),
        }
    }

    pub fn progress_path(&self, job_id: &str) -> PathBuf {
        self.upload_dir.join(format!("{job_id}.progress"))
    }

    /// Resolves a download name inside the output directory. Names that could
    /// leave the directory are refused without touching the filesystem.
    pub fn output_file(&self, filename: &str) -> Option<PathBuf> {
        is_safe_filename(filename).then(|| self.output_dir.join(filename))
    }

    /// Deletes the job's upload and sidecar. Safe to call more than once.
    pub async fn purge_job_scratch(paths: &JobPaths) {
        remove_quietly(&paths.input).await;
        remove_quietly(&paths.progress).await;
    }

    /// Deletes every regular file in both directories older than `ttl`.
    pub async fn sweep(&self, ttl: Duration) -> SweepReport {
        let mut report = SweepReport::default();
        let now = SystemTime::now();

        for dir in [&self.upload_dir, &self.output_dir] {
            sweep_dir(dir, ttl, now, &mut report).await;
        }

        if report.removed > 0 || report.failed > 0 {
            info!(removed = report.removed, failed = report.failed, "🧹 Scratch sweep finished");
        } else {
            debug!("Scratch sweep found nothing to remove");
        }
        report
    }
}

async fn sweep_dir(dir: &Path, ttl: Duration, now: SystemTime, report: &mut SweepReport) {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Cannot list scratch directory");
            report.failed += 1;
            return;
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Scratch directory listing interrupted");
                report.failed += 1;
                break;
            }
        };

        let path = entry.path();
        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot stat scratch file");
                report.failed += 1;
                continue;
            }
        };

        if !metadata.is_file() {
            continue;
        }

        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or_default();
        if age <= ttl {
            continue;
        }

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(
                    path = %path.display(),
                    age_secs = age.as_secs(),
                    "Expired scratch file removed"
                );
                report.removed += 1;
            }
            // Raced with a job's own cleanup.
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to remove expired scratch file");
                report.failed += 1;
            }
        }
    }
}

async fn remove_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Scratch file removed"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove scratch file"),
    }
}

fn remove_quietly_blocking(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "Scratch file removed on drop"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove scratch file"),
    }
}

/// Owns a job's scratch files until they are purged.
///
/// Call [`JobScratch::purge`] when the job ends. If the job future is dropped
/// first, the files are removed synchronously on drop.
///
/// The output path is shared by every job that reuses an id, so it is only
/// discarded once this job has handed it to the encoder
/// ([`JobScratch::mark_encoder_started`]) and did not [`JobScratch::keep_output`].
/// An earlier result under the same id outlives a job that failed sooner.
#[derive(Debug)]
pub struct JobScratch {
    paths: JobPaths,
    encoder_started: bool,
    keep_output: bool,
    purged: bool,
}

impl JobScratch {
    pub fn new(paths: JobPaths) -> Self {
        Self {
            paths,
            encoder_started: false,
            keep_output: false,
            purged: false,
        }
    }

    pub fn paths(&self) -> &JobPaths {
        &self.paths
    }

    /// Marks the output as written by this job from here on.
    pub fn mark_encoder_started(&mut self) {
        self.encoder_started = true;
    }

    pub fn keep_output(&mut self) {
        self.keep_output = true;
    }

    fn discards_output(&self) -> bool {
        self.encoder_started && !self.keep_output
    }

    pub async fn purge(mut self) {
        ScratchStore::purge_job_scratch(&self.paths).await;
        if self.discards_output() {
            remove_quietly(&self.paths.output).await;
        }
        self.purged = true;
    }
}

impl Drop for JobScratch {
    fn drop(&mut self) {
        if self.purged {
            return;
        }

        remove_quietly_blocking(&self.paths.input);
        remove_quietly_blocking(&self.paths.progress);
        if self.discards_output() {
            remove_quietly_blocking(&self.paths.output);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};

    fn store(dir: &Path) -> ScratchStore {
        ScratchStore::new(dir.join("uploads"), dir.join("outputs"))
    }

    fn touch(path: &Path) {
        fs::write(path, b"data").unwrap();
    }

    fn age(path: &Path, by: Duration) {
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - by).unwrap();
    }

    #[tokio::test]
    async fn prepare_lays_out_flat_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        let paths = store.prepare("abc123", "MOV", MediaKind::Video);
        assert_eq!(paths.input, dir.path().join("uploads/abc123.mov"));
        assert_eq!(paths.output, dir.path().join("outputs/abc123_compressed.mp4"));
        assert_eq!(paths.progress, dir.path().join("uploads/abc123.progress"));
        assert_eq!(paths.output_name(), "abc123_compressed.mp4");

        let audio = store.prepare("t1", "flac", MediaKind::Audio);
        assert_eq!(audio.output_name(), "t1_compressed.mp3");
    }

    #[test]
    fn output_file_refuses_traversal() {
        let store = ScratchStore::new("/tmp/u", "/tmp/o");
        assert_eq!(
            store.output_file("a_compressed.mp4"),
            Some(PathBuf::from("/tmp/o/a_compressed.mp4"))
        );
        assert_eq!(store.output_file("../etc/passwd"), None);
        assert_eq!(store.output_file("sub/file.mp4"), None);
        assert_eq!(store.output_file(""), None);
    }

    #[tokio::test]
    async fn purge_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.init().await.unwrap();
        let paths = store.prepare("j", "mp4", MediaKind::Video);
        touch(&paths.input);
        touch(&paths.progress);

        ScratchStore::purge_job_scratch(&paths).await;
        ScratchStore::purge_job_scratch(&paths).await;

        assert!(!paths.input.exists());
        assert!(!paths.progress.exists());
    }

    #[tokio::test]
    async fn guard_keeps_output_only_when_asked() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.init().await.unwrap();

        let ok = store.prepare("ok", "mp4", MediaKind::Video);
        let bad = store.prepare("bad", "mp4", MediaKind::Video);
        for path in [&ok.input, &ok.output, &ok.progress, &bad.input, &bad.output, &bad.progress] {
            touch(path);
        }

        let mut kept = JobScratch::new(ok.clone());
        kept.mark_encoder_started();
        kept.keep_output();
        kept.purge().await;
        let mut failed = JobScratch::new(bad.clone());
        failed.mark_encoder_started();
        failed.purge().await;

        assert!(ok.output.exists());
        assert!(!ok.input.exists() && !ok.progress.exists());
        assert!(!bad.output.exists() && !bad.input.exists() && !bad.progress.exists());
    }

    #[tokio::test]
    async fn dropped_guard_still_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.init().await.unwrap();
        let paths = store.prepare("dropped", "wav", MediaKind::Audio);
        touch(&paths.input);
        touch(&paths.progress);
        touch(&paths.output);

        let mut scratch = JobScratch::new(paths.clone());
        scratch.mark_encoder_started();
        drop(scratch);

        assert!(!paths.input.exists());
        assert!(!paths.progress.exists());
        assert!(!paths.output.exists());
    }

    #[tokio::test]
    async fn output_outlives_a_job_that_never_reached_the_encoder() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.init().await.unwrap();
        let paths = store.prepare("reused", "mp4", MediaKind::Video);
        for path in [&paths.input, &paths.output, &paths.progress] {
            touch(path);
        }

        JobScratch::new(paths.clone()).purge().await;
        assert!(paths.output.exists());
        assert!(!paths.input.exists() && !paths.progress.exists());

        touch(&paths.input);
        drop(JobScratch::new(paths.clone()));
        assert!(paths.output.exists());
        assert!(!paths.input.exists());
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.init().await.unwrap();

        let old_upload = store.upload_dir().join("old.mp4");
        let old_output = store.output_dir().join("old_compressed.mp4");
        let fresh = store.output_dir().join("fresh_compressed.mp4");
        for path in [&old_upload, &old_output, &fresh] {
            touch(path);
        }
        age(&old_upload, Duration::from_secs(7200));
        age(&old_output, Duration::from_secs(7200));
        fs::create_dir(store.output_dir().join("nested")).unwrap();

        let report = store.sweep(Duration::from_secs(3600)).await;

        assert_eq!(report, SweepReport { removed: 2, failed: 0 });
        assert!(!old_upload.exists());
        assert!(!old_output.exists());
        assert!(fresh.exists());
        assert!(store.output_dir().join("nested").exists());
    }

    #[tokio::test]
    async fn sweep_tolerates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let report = store(dir.path()).sweep(Duration::ZERO).await;
        assert_eq!(report, SweepReport::default());
    }
}
