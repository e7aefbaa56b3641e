//! In-memory `CounterStore` for tests. Counts every call so tests can assert
//! that no database round-trip happened.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::db::CounterStore;
use crate::error::{DbError, DbResult};

#[derive(Default)]
pub struct MemoryStore {
    rows: AtomicI64,
    calls: AtomicU32,
    connect_attempts: AtomicU32,
    /// Remaining `connect()` calls that will fail before one succeeds.
    connect_failures: AtomicU32,
    fail_connect_always: AtomicBool,
    fail_queries: AtomicBool,
    /// How long each `connect()` takes before resolving.
    connect_delay: Duration,
    connect_starts: Mutex<Vec<Instant>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// `connect()` fails `n` times, then succeeds.
    pub fn failing_connects(n: u32) -> Self {
        let store = Self::new();
        store.connect_failures.store(n, Ordering::SeqCst);
        store
    }

    pub fn unreachable() -> Self {
        let store = Self::new();
        store.fail_connect_always.store(true, Ordering::SeqCst);
        store
    }

    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    /// When each `connect()` call began.
    pub fn connect_starts(&self) -> Vec<Instant> {
        self.connect_starts.lock().unwrap().clone()
    }

    pub fn set_fail_queries(&self, v: bool) {
        self.fail_queries.store(v, Ordering::SeqCst);
    }

    /// Total calls across every trait method.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn connect_attempts(&self) -> u32 {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn check_query(&self) -> DbResult<()> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(DbError::Query(sqlx::Error::Protocol("lost connection during query".into())));
        }
        Ok(())
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn connect(&self) -> DbResult<()> {
        self.record_call();
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);
        self.connect_starts.lock().unwrap().push(Instant::now());
        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }
        if self.fail_connect_always.load(Ordering::SeqCst) {
            return Err(DbError::Connection(sqlx::Error::PoolTimedOut));
        }
        let remaining = self.connect_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.connect_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(DbError::Connection(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    async fn ensure_schema(&self) -> DbResult<()> {
        self.record_call();
        Ok(())
    }

    async fn count_rows(&self) -> DbResult<i64> {
        self.record_call();
        self.check_query()?;
        Ok(self.rows.load(Ordering::SeqCst))
    }

    async fn insert_row(&self) -> DbResult<()> {
        self.record_call();
        self.check_query()?;
        self.rows.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn truncate(&self) -> DbResult<()> {
        self.record_call();
        self.check_query()?;
        self.rows.store(0, Ordering::SeqCst);
        Ok(())
    }
}
