//! Retryable database transactions.
//!
//! [`with_transaction`] runs a caller-supplied unit of work inside a
//! transaction and retries it when the store reports a transient write
//! conflict. Every attempt opens a fresh session; the only state carried
//! across attempts is the attempt counter and its backoff delay.
//!
//! ## Error mapping
//!
//! SQLx errors are classified into [`StoreError`] as follows:
//!
//! | SQLx error | SQLSTATE | StoreError | Scenario |
//! |------------|----------|------------|----------|
//! | Database | `40001` | `TransientConflict` | Serialization failure under concurrent writers; retried |
//! | Database | `40P01` | `TransientConflict` | Deadlock detected; retried |
//! | Database | `23505` | `Conflict` | Unique violation (duplicate username, duplicate follow edge) |
//! | Database | `23503`, `23514` | `InvalidData` | Referential/check constraint violation |
//! | Database (other) | any | `Storage` | Other database errors |
//! | RowNotFound | n/a | `NotFound` | `fetch_one` on a missing row |
//! | PoolClosed / other | n/a | `Storage` | Connection failures etc. |

use std::time::Duration;

use futures::future::BoxFuture;
use thiserror::Error;
use tracing::warn;

/// Default number of transaction attempts (1 initial + 2 retries).
pub const DEFAULT_TXN_ATTEMPTS: u32 = 3;

/// Base backoff unit; attempt N waits `N × RETRY_BASE_DELAY` before retrying.
pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

/// Storage-layer error.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store-reported write conflict that is expected to succeed if retried.
    #[error("transient transaction conflict: {0}")]
    TransientConflict(String),

    /// Durable conflict (e.g. unique constraint violation).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The requested record does not exist.
    #[error("not found")]
    NotFound,

    /// The record could not be written or decoded as-is.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// All transaction attempts were consumed without a successful commit.
    /// Deliberately does not carry the original cause.
    #[error("transaction failed after exhausting retries")]
    TransactionExhausted,

    /// Everything else: connection loss, pool closed, unexpected rows.
    #[error("storage error: {0}")]
    Storage(String),
}

impl StoreError {
    /// Whether retrying the same unit of work may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::TransientConflict(_))
    }
}

/// Map a sqlx error into the [`StoreError`] taxonomy (see module docs).
pub fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("40001") | Some("40P01") => StoreError::TransientConflict(msg),
                Some("23505") => StoreError::Conflict(msg),
                Some("23503") | Some("23514") => StoreError::InvalidData(msg),
                _ => StoreError::Storage(msg),
            }
        }
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::PoolClosed => {
            StoreError::Storage(format!("connection pool closed in {operation}"))
        }
        other => StoreError::Storage(format!("sqlx error in {operation}: {other}")),
    }
}

/// A source of transaction sessions.
///
/// `begin` hands out an owned session; exactly one of `commit`/`abort`
/// consumes it, so a session cannot leak past the wrapper on any path.
#[async_trait::async_trait]
pub trait TxnBackend: Send + Sync {
    type Session: Send;

    async fn begin(&self) -> Result<Self::Session, StoreError>;
    async fn commit(&self, session: Self::Session) -> Result<(), StoreError>;
    async fn abort(&self, session: Self::Session) -> Result<(), StoreError>;
}

/// Postgres transactions over a shared pool.
#[derive(Debug, Clone)]
pub struct PgTxnBackend {
    pool: sqlx::PgPool,
}

impl PgTxnBackend {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl TxnBackend for PgTxnBackend {
    type Session = sqlx::Transaction<'static, sqlx::Postgres>;

    async fn begin(&self) -> Result<Self::Session, StoreError> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))
    }

    async fn commit(&self, session: Self::Session) -> Result<(), StoreError> {
        session.commit().await.map_err(|e| map_sqlx_error("commit", e))
    }

    async fn abort(&self, session: Self::Session) -> Result<(), StoreError> {
        session
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

/// Run `work` in a transaction with the default attempt budget.
pub async fn with_transaction<B, T, F>(backend: &B, work: F) -> Result<T, StoreError>
where
    B: TxnBackend,
    F: for<'s> FnMut(&'s mut B::Session) -> BoxFuture<'s, Result<T, StoreError>>,
{
    with_transaction_attempts(backend, DEFAULT_TXN_ATTEMPTS, work).await
}

/// Run `work` in a transaction, retrying transient conflicts up to
/// `max_attempts` total attempts.
///
/// Per attempt: begin a fresh session, run the unit of work, commit. A failed
/// unit of work aborts its session. Transient failures wait a linearly
/// increasing delay (`attempt × 100ms`) and retry while attempts remain;
/// anything else propagates immediately. When every attempt conflicts, the
/// caller gets [`StoreError::TransactionExhausted`] rather than the original
/// error.
pub async fn with_transaction_attempts<B, T, F>(
    backend: &B,
    max_attempts: u32,
    mut work: F,
) -> Result<T, StoreError>
where
    B: TxnBackend,
    F: for<'s> FnMut(&'s mut B::Session) -> BoxFuture<'s, Result<T, StoreError>>,
{
    for attempt in 1..=max_attempts {
        let mut session = backend.begin().await?;

        match work(&mut session).await {
            Ok(value) => match backend.commit(session).await {
                Ok(()) => return Ok(value),
                Err(err) if err.is_transient() => {
                    warn!(attempt, error = %err, "transaction commit conflicted");
                    if attempt < max_attempts {
                        tokio::time::sleep(RETRY_BASE_DELAY * attempt).await;
                    }
                }
                Err(err) => return Err(err),
            },
            Err(err) => {
                // Release the session before deciding anything else.
                if let Err(abort_err) = backend.abort(session).await {
                    warn!(error = %abort_err, "transaction abort failed");
                }
                if !err.is_transient() {
                    return Err(err);
                }
                warn!(attempt, error = %err, "transient transaction conflict");
                if attempt < max_attempts {
                    tokio::time::sleep(RETRY_BASE_DELAY * attempt).await;
                }
            }
        }
    }

    Err(StoreError::TransactionExhausted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Backend that counts session lifecycle calls. The session itself is the
    /// 1-based attempt number.
    #[derive(Default)]
    struct CountingBackend {
        begins: AtomicU32,
        commits: AtomicU32,
        aborts: AtomicU32,
    }

    impl CountingBackend {
        fn counts(&self) -> (u32, u32, u32) {
            (
                self.begins.load(Ordering::SeqCst),
                self.commits.load(Ordering::SeqCst),
                self.aborts.load(Ordering::SeqCst),
            )
        }
    }

    #[async_trait::async_trait]
    impl TxnBackend for CountingBackend {
        type Session = u32;

        async fn begin(&self) -> Result<u32, StoreError> {
            Ok(self.begins.fetch_add(1, Ordering::SeqCst) + 1)
        }

        async fn commit(&self, _session: u32) -> Result<(), StoreError> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn abort(&self, _session: u32) -> Result<(), StoreError> {
            self.aborts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn transient() -> StoreError {
        StoreError::TransientConflict("write conflict".into())
    }

    #[tokio::test]
    async fn first_attempt_success_commits_once() {
        let backend = CountingBackend::default();

        let result = with_transaction(&backend, |session| {
            let attempt = *session;
            async move { Ok(attempt) }.boxed()
        })
        .await
        .unwrap();

        assert_eq!(result, 1);
        assert_eq!(backend.counts(), (1, 1, 0));
    }

    #[tokio::test]
    async fn transient_failures_retry_until_success() {
        // max = 3, transient on attempts 1 and 2, success on 3:
        // three begins, two aborts, one commit.
        let backend = CountingBackend::default();

        let result = with_transaction_attempts(&backend, 3, |session| {
            let attempt = *session;
            async move {
                if attempt < 3 {
                    Err(transient())
                } else {
                    Ok("done")
                }
            }
            .boxed()
        })
        .await
        .unwrap();

        assert_eq!(result, "done");
        assert_eq!(backend.counts(), (3, 1, 2));
    }

    #[tokio::test]
    async fn non_transient_error_propagates_without_retry() {
        let backend = CountingBackend::default();

        let result: Result<(), _> = with_transaction(&backend, |_session| {
            async move { Err(StoreError::InvalidData("bad record".into())) }.boxed()
        })
        .await;

        // The caller sees the original error, not the exhaustion error.
        assert!(matches!(result, Err(StoreError::InvalidData(_))));
        assert_eq!(backend.counts(), (1, 0, 1));
    }

    #[tokio::test]
    async fn exhaustion_raises_generic_error() {
        let backend = CountingBackend::default();

        let result: Result<(), _> =
            with_transaction_attempts(&backend, 3, |_session| {
                async move { Err(transient()) }.boxed()
            })
            .await;

        assert!(matches!(result, Err(StoreError::TransactionExhausted)));
        // Every attempt opened and aborted its own session.
        assert_eq!(backend.counts(), (3, 0, 3));
    }

    #[tokio::test]
    async fn abort_failure_does_not_mask_original_error() {
        struct BrokenAbort;

        #[async_trait::async_trait]
        impl TxnBackend for BrokenAbort {
            type Session = ();

            async fn begin(&self) -> Result<(), StoreError> {
                Ok(())
            }

            async fn commit(&self, _session: ()) -> Result<(), StoreError> {
                Ok(())
            }

            async fn abort(&self, _session: ()) -> Result<(), StoreError> {
                Err(StoreError::Storage("connection lost".into()))
            }
        }

        let result: Result<(), _> = with_transaction(&BrokenAbort, |_session| {
            async move { Err(StoreError::NotFound) }.boxed()
        })
        .await;

        assert!(matches!(result, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn success_on_final_attempt_still_succeeds() {
        let backend = CountingBackend::default();
        let calls = AtomicU32::new(0);

        let result = with_transaction_attempts(&backend, 2, |_session| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n == 1 { Err(transient()) } else { Ok(n) }
            }
            .boxed()
        })
        .await
        .unwrap();

        assert_eq!(result, 2);
        assert_eq!(backend.counts(), (2, 1, 1));
    }
}
