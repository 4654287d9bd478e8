//! Infrastructure layer: database access, the transactional retry wrapper,
//! entity stores (Postgres and in-memory), media storage, the job queue, and
//! the background workers that consume it.

pub mod db;
pub mod jobs;
pub mod media;
pub mod stores;
pub mod txn;
pub mod workers;

pub use txn::{StoreError, TxnBackend, with_transaction, with_transaction_attempts};
