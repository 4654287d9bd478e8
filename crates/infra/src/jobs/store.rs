//! Job storage.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;

use super::types::{DeadLetterEntry, Job, JobId, JobStatus};

/// Job store abstraction. Synchronous by design: every implementation is a
/// quick map or row operation, and handlers never hold the store across an
/// await.
pub trait JobStore: Send + Sync {
    /// Enqueue a new job.
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError>;

    /// Get a job by id.
    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError>;

    /// Persist an updated job.
    fn update(&self, job: &Job) -> Result<(), JobStoreError>;

    /// Claim the oldest ready job and mark it running. `None` when nothing is
    /// due.
    fn claim_next(&self) -> Result<Option<Job>, JobStoreError>;

    /// List jobs, optionally filtered to one status, oldest first.
    fn list_by_status(
        &self,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError>;

    /// Move a job to the dead-letter queue.
    fn dead_letter(&self, job: Job, reason: String) -> Result<(), JobStoreError>;

    /// List dead-lettered jobs, oldest first.
    fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, JobStoreError>;

    /// Move a dead-lettered job back to pending with a fresh attempt budget.
    fn retry_dead_letter(&self, job_id: JobId) -> Result<Job, JobStoreError>;

    /// Aggregate job counts by status.
    fn stats(&self) -> Result<JobStats, JobStoreError>;
}

/// Job store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Job counts by status.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct JobStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub dead_lettered: usize,
}

/// In-memory job store for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
    dead_letters: RwLock<HashMap<JobId, DeadLetterEntry>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl JobStore for InMemoryJobStore {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        if jobs.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        let id = job.id;
        jobs.insert(id, job);
        Ok(id)
    }

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        Ok(jobs.get(&job_id).cloned())
    }

    fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        if !jobs.contains_key(&job.id) {
            return Err(JobStoreError::NotFound(job.id));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    fn claim_next(&self) -> Result<Option<Job>, JobStoreError> {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());

        // Oldest ready job first, so retries with backoff don't starve newer
        // work and claiming stays FIFO.
        let next = jobs
            .values()
            .filter(|j| {
                matches!(j.status, JobStatus::Pending | JobStatus::Failed { .. }) && j.is_ready()
            })
            .min_by_key(|j| j.created_at)
            .map(|j| j.id);

        if let Some(job_id) = next {
            if let Some(job) = jobs.get_mut(&job_id) {
                job.mark_running();
                return Ok(Some(job.clone()));
            }
        }
        Ok(None)
    }

    fn list_by_status(
        &self,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError> {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        let mut result: Vec<_> = jobs
            .values()
            .filter(|j| {
                status
                    .as_ref()
                    .is_none_or(|s| std::mem::discriminant(&j.status) == std::mem::discriminant(s))
            })
            .cloned()
            .collect();

        result.sort_by_key(|j| j.created_at);
        result.truncate(limit);
        Ok(result)
    }

    fn dead_letter(&self, mut job: Job, reason: String) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        let mut dls = self.dead_letters.write().unwrap_or_else(|e| e.into_inner());

        job.status = JobStatus::DeadLettered {
            error: reason.clone(),
            attempts: job.attempt,
        };
        job.updated_at = Utc::now();

        jobs.remove(&job.id);
        dls.insert(job.id, DeadLetterEntry::new(job, reason));
        Ok(())
    }

    fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, JobStoreError> {
        let dls = self.dead_letters.read().unwrap_or_else(|e| e.into_inner());
        let mut result: Vec<_> = dls.values().cloned().collect();
        result.sort_by_key(|e| e.dead_lettered_at);
        result.truncate(limit);
        Ok(result)
    }

    fn retry_dead_letter(&self, job_id: JobId) -> Result<Job, JobStoreError> {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        let mut dls = self.dead_letters.write().unwrap_or_else(|e| e.into_inner());

        let entry = dls.remove(&job_id).ok_or(JobStoreError::NotFound(job_id))?;

        let mut job = entry.job;
        job.status = JobStatus::Pending;
        job.attempt = 0;
        job.scheduled_at = None;
        job.updated_at = Utc::now();
        job.history.clear();

        jobs.insert(job.id, job.clone());
        Ok(job)
    }

    fn stats(&self) -> Result<JobStats, JobStoreError> {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        let dls = self.dead_letters.read().unwrap_or_else(|e| e.into_inner());

        let mut stats = JobStats::default();
        for job in jobs.values() {
            match &job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed { .. } => stats.failed += 1,
                JobStatus::DeadLettered { .. } => stats.dead_lettered += 1,
            }
        }
        stats.dead_lettered += dls.len();
        Ok(stats)
    }
}

impl<S: JobStore + ?Sized> JobStore for Arc<S> {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        (**self).enqueue(job)
    }

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        (**self).get(job_id)
    }

    fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        (**self).update(job)
    }

    fn claim_next(&self) -> Result<Option<Job>, JobStoreError> {
        (**self).claim_next()
    }

    fn list_by_status(
        &self,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError> {
        (**self).list_by_status(status, limit)
    }

    fn dead_letter(&self, job: Job, reason: String) -> Result<(), JobStoreError> {
        (**self).dead_letter(job, reason)
    }

    fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, JobStoreError> {
        (**self).list_dead_letters(limit)
    }

    fn retry_dead_letter(&self, job_id: JobId) -> Result<Job, JobStoreError> {
        (**self).retry_dead_letter(job_id)
    }

    fn stats(&self) -> Result<JobStats, JobStoreError> {
        (**self).stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mingle_core::PostId;

    #[test]
    fn enqueue_and_claim() {
        let store = InMemoryJobStore::new();
        let job_id = store.enqueue(Job::cleanup_post(PostId::new())).unwrap();

        let claimed = store.claim_next().unwrap().unwrap();
        assert_eq!(claimed.id, job_id);
        assert!(matches!(claimed.status, JobStatus::Running));
        assert_eq!(claimed.attempt, 1);

        assert!(store.claim_next().unwrap().is_none());
    }

    #[test]
    fn claim_skips_jobs_backing_off() {
        let store = InMemoryJobStore::new();
        let mut job = Job::cleanup_post(PostId::new());
        job.scheduled_at = Some(Utc::now() + chrono::Duration::hours(1));
        store.enqueue(job).unwrap();

        assert!(store.claim_next().unwrap().is_none());
    }

    #[test]
    fn dead_letter_flow() {
        let store = InMemoryJobStore::new();
        let job = Job::cleanup_post(PostId::new());
        let job_id = job.id;
        store.enqueue(job).unwrap();

        let mut claimed = store.claim_next().unwrap().unwrap();
        claimed.mark_failed("boom".to_string(), Utc::now());
        store.dead_letter(claimed, "max retries exceeded".to_string()).unwrap();

        assert!(store.get(job_id).unwrap().is_none());
        let dls = store.list_dead_letters(10).unwrap();
        assert_eq!(dls.len(), 1);
        assert_eq!(dls[0].job.id, job_id);

        let retried = store.retry_dead_letter(job_id).unwrap();
        assert!(matches!(retried.status, JobStatus::Pending));
        assert_eq!(retried.attempt, 0);
        assert!(store.list_dead_letters(10).unwrap().is_empty());
    }

    #[test]
    fn stats_tracking() {
        let store = InMemoryJobStore::new();
        for _ in 0..5 {
            store.enqueue(Job::cleanup_post(PostId::new())).unwrap();
        }

        store.claim_next().unwrap();
        store.claim_next().unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.pending, 3);
        assert_eq!(stats.running, 2);
    }
}
