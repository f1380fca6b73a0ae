//! # Store
//!
//! A polymorphic record store. Records are JSON documents addressed by
//! table name; the concrete engine (document store, relational, in-memory)
//! stays behind the traits below so no vendor types leak into the manager.
//!
//! Operations invoked on a [`Store`] handle directly run outside any
//! transaction, opening and closing their own connection. Operations
//! invoked on a [`Transaction`] observe the transaction's own prior writes
//! and are isolated from concurrent writers until commit.

pub mod mem;

use std::pin::Pin;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::Result;
use crate::config::{MAX_TRANSACTION_TIME, RETRY_BACKOFF_MS};

/// Record operations common to store handles and transactions.
pub trait Records: Send {
    /// Insert a record.
    ///
    /// Fails with `WriteConflict` when a record with the same unique key
    /// already exists in the table.
    fn create(&mut self, table: &str, record: Value) -> impl Future<Output = Result<()>> + Send;

    /// Replace the record whose `key` field equals `value`.
    ///
    /// Fails with `NotFound` when no such record exists.
    fn update(
        &mut self, table: &str, key: &str, value: &str, record: Value,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Fetch the first record whose `key` field equals `value`.
    fn get_by_field(
        &mut self, table: &str, key: &str, value: &str,
    ) -> impl Future<Output = Result<Option<Value>>> + Send;

    /// Fetch every record whose `key` field equals `value`.
    fn get_all_by_field(
        &mut self, table: &str, key: &str, value: &str,
    ) -> impl Future<Output = Result<Vec<Value>>> + Send;

    /// Fetch an arbitrary record from the table.
    fn get_any(&mut self, table: &str) -> impl Future<Output = Result<Option<Value>>> + Send;

    /// Fetch every record in the table.
    fn get_all(&mut self, table: &str) -> impl Future<Output = Result<Vec<Value>>> + Send;
}

/// A transaction over the store.
///
/// Reads observe the transaction's prior writes. Across transactions,
/// committed outcomes are equivalent to some serial order; an interleaving
/// commit surfaces as `WriteConflict`.
pub trait Transaction: Records {
    /// Atomically apply the transaction's writes.
    fn commit(self) -> impl Future<Output = Result<()>> + Send;

    /// Discard the transaction's writes.
    fn rollback(self) -> impl Future<Output = Result<()>> + Send;
}

/// A connected store.
///
/// Server-backed implementations should size their connection pool at
/// least 100 connections beyond the manager's concurrency limit, so
/// transactional work never starves the one-shot operations.
pub trait Store: Records + Clone + Send + Sync + 'static {
    /// The engine's transaction handle.
    type Txn: Transaction;

    /// Open a transaction.
    fn begin(&self) -> impl Future<Output = Result<Self::Txn>> + Send;

    /// Whether the configured database exists.
    fn database_exists(&self) -> impl Future<Output = Result<bool>> + Send;

    /// Create the configured database. A no-op for engines that create
    /// databases implicitly.
    fn create_database(&self) -> impl Future<Output = Result<()>> + Send;

    /// Whether the named table exists.
    fn table_exists(&self, table: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Whether the named table holds no records.
    fn table_empty(&self, table: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Create the named table, declaring the field enforced as its unique
    /// key. A no-op when the table already exists.
    fn create_table(&self, table: &str, unique_key: &str)
    -> impl Future<Output = Result<()>> + Send;
}

/// The future returned by a transaction body.
pub type TxnFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Run `f` inside a transaction, retrying on transient failure.
///
/// A fresh transaction is opened per attempt. Attempts failing with a
/// retryable error (`WriteConflict`, `InvalidDatabaseTransaction`,
/// `StatusListCapacity`) are rolled back, delayed by a uniform random
/// backoff in `[0, 1000)` ms, and retried until the transaction deadline
/// expires. All other errors roll back and propagate immediately.
///
/// Cancelling (dropping) the returned future abandons the current attempt;
/// its buffered writes are discarded and no retry follows.
///
/// # Errors
///
/// Returns the last error raised by `f` or by commit.
pub async fn execute_transaction<S, T, F>(store: &S, f: F) -> Result<T>
where
    S: Store,
    F: for<'a> Fn(&'a mut S::Txn) -> TxnFuture<'a, T>,
{
    let deadline = Instant::now() + MAX_TRANSACTION_TIME;

    loop {
        let mut txn = store.begin().await?;
        let outcome = match f(&mut txn).await {
            Ok(value) => txn.commit().await.map(|()| value),
            Err(e) => {
                if let Err(rollback_err) = txn.rollback().await {
                    tracing::debug!("rollback failed: {rollback_err}");
                }
                Err(e)
            }
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && Instant::now() < deadline => {
                tracing::debug!("retrying transaction: {e}");
                tokio::time::sleep(Duration::from_millis(fastrand::u64(0..RETRY_BACKOFF_MS))).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::mem::{ConnectOptions, MemStore};
    use super::*;
    use crate::Error;

    fn connect(tag: &str) -> MemStore {
        MemStore::connect(&ConnectOptions {
            url: Some(format!("mem://store-tests-{tag}")),
            database: "credentialStatus".to_string(),
            ..ConnectOptions::default()
        })
        .expect("should connect")
    }

    #[tokio::test]
    async fn commit_applies_writes() {
        let store = connect("commit");
        store.create_database().await.expect("should create database");
        store.create_table("Event", "id").await.expect("should create table");

        let mut txn = store.begin().await.expect("should begin");
        txn.create("Event", json!({"id": "e1", "valid": true})).await.expect("should create");

        // buffered writes are invisible outside the transaction
        let mut outside = store.clone();
        assert!(outside.get_any("Event").await.expect("should read").is_none());

        txn.commit().await.expect("should commit");
        let row = outside.get_by_field("Event", "id", "e1").await.expect("should read");
        assert_eq!(row.expect("row exists")["valid"], json!(true));
    }

    #[tokio::test]
    async fn interleaved_write_conflicts() {
        let store = connect("conflict");
        store.create_database().await.expect("should create database");
        store.create_table("Config", "id").await.expect("should create table");
        let mut seed = store.clone();
        seed.create("Config", json!({"id": "c1", "counter": 0})).await.expect("should create");

        let mut first = store.begin().await.expect("should begin");
        let mut second = store.begin().await.expect("should begin");

        let read = first.get_by_field("Config", "id", "c1").await.expect("read").expect("row");
        assert_eq!(read["counter"], json!(0));
        first.update("Config", "id", "c1", json!({"id": "c1", "counter": 1})).await.expect("update");

        second.get_by_field("Config", "id", "c1").await.expect("read").expect("row");
        second.update("Config", "id", "c1", json!({"id": "c1", "counter": 7})).await.expect("update");

        first.commit().await.expect("first commit wins");
        let Err(Error::WriteConflict(_)) = second.commit().await else {
            panic!("second commit should conflict");
        };
    }

    #[tokio::test]
    async fn retries_until_success() {
        let store = connect("retry");
        store.create_database().await.expect("should create database");
        store.create_table("Config", "id").await.expect("should create table");

        let attempts = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&attempts);
        let result = execute_transaction(&store, move |txn| {
            let counted = Arc::clone(&counted);
            Box::pin(async move {
                if counted.fetch_add(1, Ordering::SeqCst) < 2 {
                    return Err(Error::WriteConflict("simulated".to_string()));
                }
                txn.create("Config", json!({"id": "c1"})).await?;
                Ok(42)
            })
        })
        .await;

        assert_eq!(result.expect("should eventually succeed"), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn aborts_on_non_retryable_error() {
        let store = connect("abort");
        store.create_database().await.expect("should create database");
        store.create_table("Config", "id").await.expect("should create table");

        let result: Result<()> = execute_transaction(&store, |txn| {
            Box::pin(async move {
                txn.create("Config", json!({"id": "c1"})).await?;
                Err(Error::BadRequest("no retry".to_string()))
            })
        })
        .await;

        let Err(Error::BadRequest(_)) = result else {
            panic!("should abort");
        };
        // the aborted attempt's write rolled back
        let mut store = store;
        assert!(store.get_any("Config").await.expect("should read").is_none());
    }
}
