use super::model::{Job, JobState};
use crate::common::error::AppError;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// In-memory table of jobs that are currently admitted or running.
#[derive(Clone, Default)]
pub struct JobRepository {
    jobs: Arc<DashMap<String, Job>>,
}

/// Registration of one active job. Dropping it removes the entry.
pub struct JobHandle {
    jobs: Arc<DashMap<String, Job>>,
    id: String,
    cancel: CancellationToken,
}

impl JobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, job: Job) -> Result<JobHandle, AppError> {
        match self.jobs.entry(job.id.clone()) {
            Entry::Occupied(_) => Err(AppError::JobConflict(job.id)),
            Entry::Vacant(slot) => {
                let handle = JobHandle {
                    jobs: self.jobs.clone(),
                    id: job.id.clone(),
                    cancel: job.cancel.clone(),
                };
                slot.insert(job);
                debug!(job_id = %handle.id, "Job registered");
                Ok(handle)
            }
        }
    }

    pub fn find(&self, id: &str) -> Option<Job> {
        self.jobs.get(id).map(|job| job.value().clone())
    }

    /// Fires the job's cancellation token. `false` if no such job is active.
    pub fn cancel(&self, id: &str) -> bool {
        match self.jobs.get(id) {
            Some(job) => {
                job.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn active_count(&self) -> usize {
        self.jobs.len()
    }

    pub fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.iter().map(|job| job.value().clone()).collect();
        jobs.sort_by_key(|job| job.created_at);
        jobs
    }
}

impl JobHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn set_state(&self, state: JobState) {
        if let Some(mut job) = self.jobs.get_mut(&self.id) {
            debug!(job_id = %self.id, from = ?job.state, to = ?state, "Job state changed");
            job.state = state;
        }
    }
}

impl Drop for JobHandle {
    fn drop(&mut self) {
        self.jobs.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::media::MediaKind;
    use crate::infrastructure::storage::scratch::ScratchStore;

    fn job(id: &str) -> Job {
        let store = ScratchStore::new("/tmp/u", "/tmp/o");
        Job::new(id, MediaKind::Video, "clip.mp4", store.prepare(id, "mp4", MediaKind::Video))
    }

    #[test]
    fn active_id_cannot_be_registered_twice() {
        let repo = JobRepository::new();
        let _first = repo.register(job("abc")).unwrap();

        let err = repo.register(job("abc")).err().unwrap();
        assert!(matches!(err, AppError::JobConflict(id) if id == "abc"));
    }

    #[test]
    fn dropping_the_handle_frees_the_id() {
        let repo = JobRepository::new();
        let handle = repo.register(job("abc")).unwrap();
        assert_eq!(repo.active_count(), 1);

        drop(handle);
        assert_eq!(repo.active_count(), 0);
        assert!(repo.register(job("abc")).is_ok());
    }

    #[test]
    fn cancel_fires_the_token() {
        let repo = JobRepository::new();
        let handle = repo.register(job("abc")).unwrap();

        assert!(repo.cancel("abc"));
        assert!(handle.cancel_token().is_cancelled());
        assert!(!repo.cancel("missing"));
    }

    #[test]
    fn state_changes_are_visible() {
        let repo = JobRepository::new();
        let handle = repo.register(job("abc")).unwrap();
        assert_eq!(repo.find("abc").unwrap().state, JobState::Admitted);

        handle.set_state(JobState::Running);
        assert_eq!(repo.find("abc").unwrap().state, JobState::Running);
        assert_eq!(repo.list().len(), 1);
    }
}
