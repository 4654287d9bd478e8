//! Core job types and retry policies.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use mingle_core::{PostId, UserId};

/// Unique job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job kind, routing a job to its handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Derive display variants for a post's media attachments.
    ProcessMedia,
    /// Remove a soft-deleted post's dependent records.
    CleanupPost,
    /// Remove a soft-deleted account's artifacts.
    CleanupAccount,
    /// Fan a new-post notification out to the author's followers.
    NotifyFollowers,
}

impl JobKind {
    pub fn kind_name(&self) -> &'static str {
        match self {
            JobKind::ProcessMedia => "process_media",
            JobKind::CleanupPost => "cleanup_post",
            JobKind::CleanupAccount => "cleanup_account",
            JobKind::NotifyFollowers => "notify_followers",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind_name())
    }
}

/// Payload of a [`JobKind::ProcessMedia`] job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessMediaPayload {
    pub post_id: PostId,
    pub media_key: String,
}

/// Payload of a [`JobKind::CleanupPost`] job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupPostPayload {
    pub post_id: PostId,
}

/// Payload of a [`JobKind::CleanupAccount`] job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupAccountPayload {
    pub account_id: UserId,
}

/// Payload of a [`JobKind::NotifyFollowers`] job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyFollowersPayload {
    pub author_id: UserId,
    pub post_id: PostId,
}

/// Job execution status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Queued, waiting to be picked up.
    Pending,
    /// Currently being executed.
    Running,
    /// Completed successfully.
    Completed,
    /// Failed, will be retried.
    Failed { error: String, attempt: u32 },
    /// Exhausted retries, moved to the dead-letter queue.
    DeadLettered { error: String, attempts: u32 },
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::DeadLettered { .. })
    }
}

/// Backoff strategy for retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between retries.
    Fixed,
    /// base * 2^(attempt-1)
    #[default]
    Exponential,
    /// base * attempt
    Linear,
}

/// Retry policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts (0 = never run again after a failure).
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            strategy: BackoffStrategy::Exponential,
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 0,
            ..Default::default()
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
        }
    }

    /// Delay before the retry that follows failed attempt `attempt`
    /// (1-indexed), capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_ms = self.base_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;

        let delay_ms = match self.strategy {
            BackoffStrategy::Fixed => base_ms,
            BackoffStrategy::Exponential => (base_ms * 2_f64.powi((attempt - 1) as i32)).min(max_ms),
            BackoffStrategy::Linear => (base_ms * attempt as f64).min(max_ms),
        };

        Duration::from_millis(delay_ms as u64)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// A background job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    /// JSON payload, decoded by the handler into its typed payload struct.
    pub payload: serde_json::Value,
    pub status: JobStatus,
    pub retry_policy: RetryPolicy,
    /// Current attempt number (starts at 0, incremented on claim).
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// When the job should next run (set by retry backoff).
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Errors from previous attempts.
    pub history: Vec<JobAttemptRecord>,
}

/// Record of one execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobAttemptRecord {
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    pub error: Option<String>,
}

impl Job {
    pub fn new(kind: JobKind, payload: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            kind,
            payload,
            status: JobStatus::Pending,
            retry_policy: RetryPolicy::default(),
            attempt: 0,
            created_at: now,
            updated_at: now,
            scheduled_at: None,
            history: Vec::new(),
        }
    }

    /// Build a media-processing job.
    pub fn process_media(post_id: PostId, media_key: impl Into<String>) -> Self {
        let payload = ProcessMediaPayload {
            post_id,
            media_key: media_key.into(),
        };
        Self::new(
            JobKind::ProcessMedia,
            serde_json::to_value(payload).unwrap_or_default(),
        )
    }

    pub fn cleanup_post(post_id: PostId) -> Self {
        Self::new(
            JobKind::CleanupPost,
            serde_json::to_value(CleanupPostPayload { post_id }).unwrap_or_default(),
        )
    }

    pub fn cleanup_account(account_id: UserId) -> Self {
        Self::new(
            JobKind::CleanupAccount,
            serde_json::to_value(CleanupAccountPayload { account_id }).unwrap_or_default(),
        )
    }

    pub fn notify_followers(author_id: UserId, post_id: PostId) -> Self {
        Self::new(
            JobKind::NotifyFollowers,
            serde_json::to_value(NotifyFollowersPayload { author_id, post_id })
                .unwrap_or_default(),
        )
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Whether the job's schedule allows running it now.
    pub fn is_ready(&self) -> bool {
        match self.scheduled_at {
            Some(at) => Utc::now() >= at,
            None => true,
        }
    }

    pub fn mark_running(&mut self) {
        self.status = JobStatus::Running;
        self.attempt += 1;
        self.updated_at = Utc::now();
    }

    pub fn mark_completed(&mut self, started_at: DateTime<Utc>) {
        let now = Utc::now();
        self.status = JobStatus::Completed;
        self.updated_at = now;
        self.history.push(JobAttemptRecord {
            attempt: self.attempt,
            started_at,
            finished_at: now,
            success: true,
            error: None,
        });
    }

    /// Record a failed attempt: schedule a retry with backoff while the
    /// policy allows, dead-letter otherwise.
    pub fn mark_failed(&mut self, error: String, started_at: DateTime<Utc>) {
        let now = Utc::now();
        self.updated_at = now;
        self.history.push(JobAttemptRecord {
            attempt: self.attempt,
            started_at,
            finished_at: now,
            success: false,
            error: Some(error.clone()),
        });

        if self.retry_policy.should_retry(self.attempt) {
            let delay = self.retry_policy.delay_for_attempt(self.attempt);
            self.scheduled_at = Some(now + chrono::Duration::from_std(delay).unwrap_or_default());
            self.status = JobStatus::Failed {
                error,
                attempt: self.attempt,
            };
        } else {
            self.status = JobStatus::DeadLettered {
                error,
                attempts: self.attempt,
            };
        }
    }
}

/// Result of one handler invocation.
#[derive(Debug)]
pub enum JobResult {
    Success,
    Failure(String),
}

/// Entry in the dead-letter queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub job: Job,
    pub dead_lettered_at: DateTime<Utc>,
    pub reason: String,
}

impl DeadLetterEntry {
    pub fn new(job: Job, reason: String) -> Self {
        Self {
            job,
            dead_lettered_at: Utc::now(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_backoff_doubles() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            strategy: BackoffStrategy::Exponential,
        };

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(400));
    }

    #[test]
    fn linear_backoff_grows_with_attempt() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            strategy: BackoffStrategy::Linear,
        };

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(300));
    }

    #[test]
    fn should_retry_respects_max_attempts() {
        let policy = RetryPolicy {
            max_attempts: 3,
            ..Default::default()
        };

        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }

    #[test]
    fn job_lifecycle() {
        let mut job = Job::cleanup_post(PostId::new());
        assert!(matches!(job.status, JobStatus::Pending));
        assert_eq!(job.attempt, 0);

        job.mark_running();
        assert!(matches!(job.status, JobStatus::Running));
        assert_eq!(job.attempt, 1);

        let started = Utc::now();
        job.mark_completed(started);
        assert!(matches!(job.status, JobStatus::Completed));
        assert_eq!(job.history.len(), 1);
        assert!(job.history[0].success);
    }

    #[test]
    fn failure_retries_then_dead_letters() {
        let mut job = Job::notify_followers(UserId::new(), PostId::new())
            .with_retry_policy(RetryPolicy {
                max_attempts: 2,
                ..Default::default()
            });

        job.mark_running();
        job.mark_failed("boom".to_string(), Utc::now());
        assert!(matches!(job.status, JobStatus::Failed { .. }));
        assert!(job.scheduled_at.is_some());

        job.mark_running();
        job.mark_failed("boom again".to_string(), Utc::now());
        assert!(matches!(job.status, JobStatus::DeadLettered { .. }));
    }

    #[test]
    fn payload_round_trips() {
        let author = UserId::new();
        let post = PostId::new();
        let job = Job::notify_followers(author, post);

        let payload: NotifyFollowersPayload = serde_json::from_value(job.payload).unwrap();
        assert_eq!(payload.author_id, author);
        assert_eq!(payload.post_id, post);
    }
}
