//! Background workers: the job handlers behind each [`JobKind`].

pub mod cleanup;
pub mod fanout;
pub mod media;

use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::jobs::{
    CleanupAccountPayload, CleanupPostPayload, Job, JobExecutor, JobKind, JobResult, JobStore,
    NotifyFollowersPayload, ProcessMediaPayload,
};
use crate::media::MediaStorage;
use crate::stores::{FollowStore, MaintenanceStore, NotificationStore, PostStore};

pub use fanout::{FanOutSummary, fan_out_post_notifications};

/// Stores the workers operate on.
#[derive(Clone)]
pub struct WorkerContext {
    pub posts: Arc<dyn PostStore>,
    pub follows: Arc<dyn FollowStore>,
    pub notifications: Arc<dyn NotificationStore>,
    pub maintenance: Arc<dyn MaintenanceStore>,
    pub media: Arc<dyn MediaStorage>,
}

fn decode<P: DeserializeOwned>(job: &Job) -> Result<P, JobResult> {
    serde_json::from_value(job.payload.clone())
        .map_err(|e| JobResult::Failure(format!("decode {} payload: {e}", job.kind)))
}

/// Register every worker on the executor.
pub fn register_all<S: JobStore + 'static>(executor: &mut JobExecutor<S>, ctx: WorkerContext) {
    {
        let posts = Arc::clone(&ctx.posts);
        let storage = Arc::clone(&ctx.media);
        executor.register_handler(JobKind::ProcessMedia, move |job| {
            let posts = Arc::clone(&posts);
            let storage = Arc::clone(&storage);
            async move {
                match decode::<ProcessMediaPayload>(&job) {
                    Ok(payload) => {
                        media::run_process_media(posts.as_ref(), storage.as_ref(), payload).await
                    }
                    Err(failure) => failure,
                }
            }
        });
    }

    {
        let maintenance = Arc::clone(&ctx.maintenance);
        executor.register_handler(JobKind::CleanupPost, move |job| {
            let maintenance = Arc::clone(&maintenance);
            async move {
                match decode::<CleanupPostPayload>(&job) {
                    Ok(payload) => cleanup::run_post_cleanup(maintenance.as_ref(), payload).await,
                    Err(failure) => failure,
                }
            }
        });
    }

    {
        let maintenance = Arc::clone(&ctx.maintenance);
        executor.register_handler(JobKind::CleanupAccount, move |job| {
            let maintenance = Arc::clone(&maintenance);
            async move {
                match decode::<CleanupAccountPayload>(&job) {
                    Ok(payload) => {
                        cleanup::run_account_cleanup(maintenance.as_ref(), payload).await
                    }
                    Err(failure) => failure,
                }
            }
        });
    }

    {
        let follows = Arc::clone(&ctx.follows);
        let notifications = Arc::clone(&ctx.notifications);
        executor.register_handler(JobKind::NotifyFollowers, move |job| {
            let follows = Arc::clone(&follows);
            let notifications = Arc::clone(&notifications);
            async move {
                match decode::<NotifyFollowersPayload>(&job) {
                    Ok(payload) => {
                        match fanout::fan_out_post_notifications(
                            follows.as_ref(),
                            notifications.as_ref(),
                            payload.author_id,
                            payload.post_id,
                        )
                        .await
                        {
                            Ok(_) => JobResult::Success,
                            Err(e) => JobResult::Failure(e.to_string()),
                        }
                    }
                    Err(failure) => failure,
                }
            }
        });
    }
}
