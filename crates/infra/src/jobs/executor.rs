//! Job executor: polls the store, runs handlers, applies retry and
//! dead-letter policy.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::store::JobStore;
use super::types::{Job, JobKind, JobResult, JobStatus};

/// Job handler function type.
pub type JobHandler = Arc<dyn Fn(Job) -> BoxFuture<'static, JobResult> + Send + Sync>;

/// Executor configuration.
#[derive(Debug, Clone)]
pub struct JobExecutorConfig {
    /// How often to poll for new jobs when the queue is empty.
    pub poll_interval: Duration,
    /// Name for logging.
    pub name: String,
}

impl Default for JobExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            name: "job-executor".to_string(),
        }
    }
}

impl JobExecutorConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Handle to a running executor.
pub struct JobExecutorHandle {
    shutdown: watch::Sender<bool>,
    join: tokio::task::JoinHandle<()>,
    stats: Arc<Mutex<ExecutorStats>>,
}

impl JobExecutorHandle {
    /// Request graceful shutdown and wait for the loop to drain.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.join.await;
    }

    pub fn stats(&self) -> ExecutorStats {
        self.stats.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Executor runtime statistics.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ExecutorStats {
    pub jobs_processed: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    pub jobs_dead_lettered: u64,
    pub uptime_secs: u64,
}

/// Background job executor.
///
/// One handler per [`JobKind`]; a claimed job with no registered handler is
/// failed like any other handler error.
pub struct JobExecutor<S: JobStore> {
    store: S,
    handlers: HashMap<JobKind, JobHandler>,
}

impl<S: JobStore + 'static> JobExecutor<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            handlers: HashMap::new(),
        }
    }

    /// Register the handler for a job kind, replacing any previous one.
    pub fn register_handler<F, Fut>(&mut self, kind: JobKind, handler: F)
    where
        F: Fn(Job) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = JobResult> + Send + 'static,
    {
        self.handlers
            .insert(kind, Arc::new(move |job| handler(job).boxed()));
    }

    /// Run one already-claimed job to its next state. Exposed for tests and
    /// synchronous draining.
    pub async fn execute_one(&self, job: &mut Job) -> Result<(), String> {
        let handler = match self.handlers.get(&job.kind) {
            Some(h) => Arc::clone(h),
            None => {
                let e = format!("no handler for job kind {}", job.kind);
                warn!(job_id = %job.id, kind = %job.kind, "unroutable job");
                self.settle_failure(job, e.clone())?;
                return Err(e);
            }
        };

        let started = Utc::now();
        match handler(job.clone()).await {
            JobResult::Success => {
                job.mark_completed(started);
                self.store.update(job).map_err(|e| e.to_string())?;
                debug!(job_id = %job.id, kind = %job.kind, "job completed");
                Ok(())
            }
            JobResult::Failure(e) => {
                self.settle_failure(job, e.clone())?;
                Err(e)
            }
        }
    }

    fn settle_failure(&self, job: &mut Job, error: String) -> Result<(), String> {
        job.mark_failed(error.clone(), Utc::now());
        self.store.update(job).map_err(|e| e.to_string())?;

        if matches!(job.status, JobStatus::DeadLettered { .. }) {
            warn!(job_id = %job.id, kind = %job.kind, error = %error, "job dead-lettered");
            self.store
                .dead_letter(job.clone(), error)
                .map_err(|e| e.to_string())?;
        }
        Ok(())
    }

    /// Spawn the polling loop on the current tokio runtime.
    pub fn spawn(self, config: JobExecutorConfig) -> JobExecutorHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = Arc::new(Mutex::new(ExecutorStats::default()));
        let stats_clone = Arc::clone(&stats);

        let join = tokio::spawn(executor_loop(self, config, shutdown_rx, stats_clone));

        JobExecutorHandle {
            shutdown: shutdown_tx,
            join,
            stats,
        }
    }
}

async fn executor_loop<S: JobStore + 'static>(
    executor: JobExecutor<S>,
    config: JobExecutorConfig,
    mut shutdown_rx: watch::Receiver<bool>,
    stats: Arc<Mutex<ExecutorStats>>,
) {
    info!(executor = %config.name, "job executor started");
    let start_time = Instant::now();

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        {
            let mut s = stats.lock().unwrap_or_else(|e| e.into_inner());
            s.uptime_secs = start_time.elapsed().as_secs();
        }

        match executor.store.claim_next() {
            Ok(Some(mut job)) => {
                debug!(executor = %config.name, job_id = %job.id, kind = %job.kind, "claimed job");
                let result = executor.execute_one(&mut job).await;

                let mut s = stats.lock().unwrap_or_else(|e| e.into_inner());
                s.jobs_processed += 1;
                match result {
                    Ok(()) => s.jobs_succeeded += 1,
                    Err(_) => {
                        s.jobs_failed += 1;
                        if matches!(job.status, JobStatus::DeadLettered { .. }) {
                            s.jobs_dead_lettered += 1;
                        }
                    }
                }
            }
            Ok(None) => {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = tokio::time::sleep(config.poll_interval) => {}
                }
            }
            Err(e) => {
                error!(executor = %config.name, error = %e, "failed to claim job");
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = tokio::time::sleep(config.poll_interval) => {}
                }
            }
        }
    }

    info!(executor = %config.name, "job executor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::store::InMemoryJobStore;
    use crate::jobs::types::RetryPolicy;
    use mingle_core::PostId;

    #[tokio::test]
    async fn execute_successful_job() {
        let store = InMemoryJobStore::arc();
        let mut executor = JobExecutor::new(Arc::clone(&store));
        executor.register_handler(JobKind::CleanupPost, |_job| async { JobResult::Success });

        store.enqueue(Job::cleanup_post(PostId::new())).unwrap();

        let mut claimed = store.claim_next().unwrap().unwrap();
        executor.execute_one(&mut claimed).await.unwrap();
        assert!(matches!(claimed.status, JobStatus::Completed));
    }

    #[tokio::test]
    async fn failing_job_retries_then_dead_letters() {
        let store = InMemoryJobStore::arc();
        let mut executor = JobExecutor::new(Arc::clone(&store));
        executor.register_handler(JobKind::CleanupPost, |_job| async {
            JobResult::Failure("boom".to_string())
        });

        let job = Job::cleanup_post(PostId::new()).with_retry_policy(RetryPolicy {
            max_attempts: 2,
            ..Default::default()
        });
        store.enqueue(job).unwrap();

        let mut claimed = store.claim_next().unwrap().unwrap();
        assert!(executor.execute_one(&mut claimed).await.is_err());
        assert!(matches!(claimed.status, JobStatus::Failed { .. }));

        // Skip the backoff window for the test.
        claimed.scheduled_at = None;
        store.update(&claimed).unwrap();

        let mut claimed = store.claim_next().unwrap().unwrap();
        assert!(executor.execute_one(&mut claimed).await.is_err());
        assert!(matches!(claimed.status, JobStatus::DeadLettered { .. }));
        assert_eq!(store.list_dead_letters(10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unroutable_job_is_failed() {
        let store = InMemoryJobStore::arc();
        let executor = JobExecutor::new(Arc::clone(&store));

        store
            .enqueue(Job::cleanup_post(PostId::new()).with_retry_policy(RetryPolicy::no_retry()))
            .unwrap();

        let mut claimed = store.claim_next().unwrap().unwrap();
        assert!(executor.execute_one(&mut claimed).await.is_err());
        assert!(matches!(claimed.status, JobStatus::DeadLettered { .. }));
    }

    #[tokio::test]
    async fn spawned_executor_drains_the_queue() {
        let store = InMemoryJobStore::arc();
        let mut executor = JobExecutor::new(Arc::clone(&store));
        executor.register_handler(JobKind::CleanupPost, |_job| async { JobResult::Success });

        let job_id = store.enqueue(Job::cleanup_post(PostId::new())).unwrap();

        let handle = executor.spawn(
            JobExecutorConfig {
                poll_interval: Duration::from_millis(5),
                ..Default::default()
            }
            .with_name("test-executor"),
        );

        // Poll until the executor has picked the job up and finished it.
        for _ in 0..100 {
            if let Some(job) = store.get(job_id).unwrap() {
                if matches!(job.status, JobStatus::Completed) {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let job = store.get(job_id).unwrap().unwrap();
        assert!(matches!(job.status, JobStatus::Completed));
        assert!(handle.stats().jobs_succeeded >= 1);
        handle.shutdown().await;
    }
}
