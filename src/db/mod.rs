//! Persistence for the counter.
//!
//! The counter value is the number of rows in the `Counters` table: an
//! increment inserts a row, a clear truncates the table. Row contents are
//! never read back.

pub mod mysql;
pub mod retry;
pub mod schema;

#[cfg(test)]
pub mod memory;

use async_trait::async_trait;

use crate::error::DbResult;

pub use mysql::MySqlCounterStore;

/// Operations the HTTP layer and the reconnect loop need from the database.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Verify the database is reachable and the credentials are accepted.
    async fn connect(&self) -> DbResult<()>;

    /// Create or alter the counter table to the expected shape. Idempotent.
    async fn ensure_schema(&self) -> DbResult<()>;

    async fn count_rows(&self) -> DbResult<i64>;

    /// Insert one row with the default `count`.
    async fn insert_row(&self) -> DbResult<()>;

    /// Delete every row and reset the auto-increment id.
    async fn truncate(&self) -> DbResult<()>;
}

/// Connect then sync the schema. Success of both is what opens the gate.
pub async fn initialize(store: &dyn CounterStore) -> DbResult<()> {
    store.connect().await?;
    store.ensure_schema().await?;
    Ok(())
}
