//! Background job system with retry, backoff, and dead-letter handling.
//!
//! ## Components
//!
//! - `Job`: typed job with JSON payload and retry policy
//! - `JobStore`: persistence for queued jobs (in-memory implementation)
//! - `JobExecutor`: polling loop that routes jobs to registered handlers
//! - dead-letter queue for jobs that exhaust their retries
//!
//! Handlers for the concrete job kinds live in [`crate::workers`].

pub mod executor;
pub mod store;
pub mod types;

pub use executor::{ExecutorStats, JobExecutor, JobExecutorConfig, JobExecutorHandle};
pub use store::{InMemoryJobStore, JobStats, JobStore, JobStoreError};
pub use types::{
    BackoffStrategy, CleanupAccountPayload, CleanupPostPayload, DeadLetterEntry, Job, JobId,
    JobKind, JobResult, JobStatus, NotifyFollowersPayload, ProcessMediaPayload, RetryPolicy,
};
