//! Cleanup job handlers.
//!
//! Posts and accounts are soft-deleted at the API; these handlers do the
//! destructive follow-up work off the request path.

use tracing::info;

use crate::jobs::{CleanupAccountPayload, CleanupPostPayload, JobResult};
use crate::stores::MaintenanceStore;

/// Remove a soft-deleted post's dependent records.
pub async fn run_post_cleanup(
    store: &dyn MaintenanceStore,
    payload: CleanupPostPayload,
) -> JobResult {
    match store.cleanup_post(payload.post_id).await {
        Ok(report) => {
            info!(
                post = %payload.post_id,
                comments = report.comments,
                reactions = report.reactions,
                notifications = report.notifications,
                "post cleanup complete"
            );
            JobResult::Success
        }
        Err(e) => JobResult::Failure(e.to_string()),
    }
}

/// Remove a soft-deleted account's posts, follow edges, and notifications.
pub async fn run_account_cleanup(
    store: &dyn MaintenanceStore,
    payload: CleanupAccountPayload,
) -> JobResult {
    match store.cleanup_account(payload.account_id).await {
        Ok(report) => {
            info!(
                account = %payload.account_id,
                posts = report.posts,
                follows = report.follows,
                notifications = report.notifications,
                "account cleanup complete"
            );
            JobResult::Success
        }
        Err(e) => JobResult::Failure(e.to_string()),
    }
}
