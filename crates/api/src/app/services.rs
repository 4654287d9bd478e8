//! Infrastructure wiring: stores, job queue, workers, and the chat hub.

use std::sync::Arc;

use tracing::{error, info};

use mingle_infra::db::{DbConfig, connect};
use mingle_infra::jobs::{
    InMemoryJobStore, Job, JobExecutor, JobExecutorConfig, JobExecutorHandle, JobStore,
};
use mingle_infra::media::{InMemoryMediaStorage, MediaStorage};
use mingle_infra::stores::{
    AccountStore, ChatStore, FollowStore, InMemorySocialStore, MaintenanceStore,
    NotificationStore, PgSocialStore, PostStore,
};
use mingle_infra::workers::{self, WorkerContext};

use super::hub::ChatHub;

/// Handles shared by every request handler.
#[derive(Clone)]
pub struct AppServices {
    pub accounts: Arc<dyn AccountStore>,
    pub posts: Arc<dyn PostStore>,
    pub follows: Arc<dyn FollowStore>,
    pub notifications: Arc<dyn NotificationStore>,
    pub chat: Arc<dyn ChatStore>,
    pub maintenance: Arc<dyn MaintenanceStore>,
    pub media: Arc<dyn MediaStorage>,
    pub jobs: Arc<InMemoryJobStore>,
    pub hub: ChatHub,
}

impl AppServices {
    /// Enqueue a job, logging instead of failing the request when the queue
    /// rejects it.
    pub fn enqueue(&self, job: Job) {
        let kind = job.kind;
        match self.jobs.enqueue(job) {
            Ok(id) => info!(job_id = %id, kind = %kind, "job enqueued"),
            Err(e) => error!(kind = %kind, error = %e, "failed to enqueue job"),
        }
    }

    fn worker_context(&self) -> WorkerContext {
        WorkerContext {
            posts: Arc::clone(&self.posts),
            follows: Arc::clone(&self.follows),
            notifications: Arc::clone(&self.notifications),
            maintenance: Arc::clone(&self.maintenance),
            media: Arc::clone(&self.media),
        }
    }

    /// Spawn the background job executor wired to this service set.
    pub fn spawn_executor(&self) -> JobExecutorHandle {
        let mut executor = JobExecutor::new(Arc::clone(&self.jobs));
        workers::register_all(&mut executor, self.worker_context());
        executor.spawn(JobExecutorConfig::default().with_name("mingle-jobs"))
    }
}

/// Build services from the environment: Postgres stores when `DATABASE_URL`
/// is set, in-memory stores otherwise. Spawns the job executor either way.
pub async fn build_services() -> AppServices {
    let services = match std::env::var("DATABASE_URL") {
        Ok(url) => match connect(&DbConfig::new(url)).await {
            Ok(pool) => {
                info!("using postgres stores");
                let store = Arc::new(PgSocialStore::new(pool));
                assemble(store)
            }
            Err(e) => {
                error!(error = %e, "postgres connection failed, falling back to in-memory stores");
                assemble(Arc::new(InMemorySocialStore::new()))
            }
        },
        Err(_) => {
            info!("DATABASE_URL not set; using in-memory stores");
            assemble(Arc::new(InMemorySocialStore::new()))
        }
    };

    // Leak the handle: dropping it would signal shutdown, and the executor
    // runs for the whole process lifetime.
    std::mem::forget(services.spawn_executor());

    services
}

/// Build fully in-memory services without spawning the executor; tests drive
/// jobs through [`AppServices::spawn_executor`] themselves.
pub fn build_in_memory_services() -> AppServices {
    assemble(Arc::new(InMemorySocialStore::new()))
}

fn assemble<S>(store: Arc<S>) -> AppServices
where
    S: AccountStore
        + PostStore
        + FollowStore
        + NotificationStore
        + ChatStore
        + MaintenanceStore
        + 'static,
{
    AppServices {
        accounts: store.clone(),
        posts: store.clone(),
        follows: store.clone(),
        notifications: store.clone(),
        chat: store.clone(),
        maintenance: store,
        media: Arc::new(InMemoryMediaStorage::new()),
        jobs: InMemoryJobStore::arc(),
        hub: ChatHub::new(),
    }
}
