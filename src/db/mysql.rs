use std::time::Duration;

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use tracing::{debug, info};

use crate::config::{pool, DbConfig, COUNTER_TABLE, DB_NAME};
use crate::db::retry::with_retry;
use crate::db::schema::{add_column_sql, create_table_sql, missing_columns, modify_column_sql, COUNTER_COLUMNS};
use crate::db::CounterStore;
use crate::error::{DbError, DbResult};

/// Counter table on a MySQL server, accessed through a bounded pool.
///
/// The pool is created lazily: no socket is opened until the first query,
/// so construction never fails and `connect()` is the liveness check.
pub struct MySqlCounterStore {
    pool: MySqlPool,
}

impl MySqlCounterStore {
    pub fn new(cfg: &DbConfig) -> Self {
        let options = MySqlConnectOptions::new()
            .host(&cfg.host)
            .port(cfg.port)
            .username(&cfg.username)
            .password(&cfg.password)
            .database(DB_NAME);

        let pool = MySqlPoolOptions::new()
            .max_connections(pool::MAX_CONNECTIONS)
            .min_connections(pool::MIN_CONNECTIONS)
            .acquire_timeout(Duration::from_secs(pool::ACQUIRE_TIMEOUT_SECS))
            .idle_timeout(Some(Duration::from_secs(pool::IDLE_TIMEOUT_SECS)))
            .connect_lazy_with(options);

        Self { pool }
    }

    /// Close every pooled connection. Used on shutdown.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn existing_columns(&self) -> Result<Vec<String>, sqlx::Error> {
        with_retry("list_columns", || {
            sqlx::query_scalar::<_, String>(
                r#"
                SELECT CAST(COLUMN_NAME AS CHAR)
                FROM information_schema.COLUMNS
                WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
                ORDER BY ORDINAL_POSITION
                "#,
            )
            .bind(COUNTER_TABLE)
            .fetch_all(&self.pool)
        })
        .await
    }

    async fn execute(&self, op: &str, sql: &str) -> Result<u64, sqlx::Error> {
        debug!(op, "{sql}");
        let result = with_retry(op, || sqlx::query(sql).execute(&self.pool)).await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl CounterStore for MySqlCounterStore {
    async fn connect(&self) -> DbResult<()> {
        self.execute("authenticate", "SELECT 1+1 AS result")
            .await
            .map_err(DbError::Connection)?;
        Ok(())
    }

    async fn ensure_schema(&self) -> DbResult<()> {
        self.execute("create_table", &create_table_sql(COUNTER_TABLE))
            .await
            .map_err(DbError::Schema)?;

        let existing = self.existing_columns().await.map_err(DbError::Schema)?;
        let missing = missing_columns(&existing);
        for column in &missing {
            info!(table = COUNTER_TABLE, column = column.name, "Adding missing column");
            self.execute("add_column", &add_column_sql(COUNTER_TABLE, column))
                .await
                .map_err(DbError::Schema)?;
        }

        for column in COUNTER_COLUMNS {
            if missing.iter().any(|m| m.name == column.name) {
                continue;
            }
            self.execute("modify_column", &modify_column_sql(COUNTER_TABLE, column))
                .await
                .map_err(DbError::Schema)?;
        }

        Ok(())
    }

    async fn count_rows(&self) -> DbResult<i64> {
        let sql = format!("SELECT COUNT(*) FROM `{COUNTER_TABLE}`");
        with_retry("count", || sqlx::query_scalar::<_, i64>(&sql).fetch_one(&self.pool))
            .await
            .map_err(DbError::Query)
    }

    async fn insert_row(&self) -> DbResult<()> {
        let sql = format!(
            "INSERT INTO `{COUNTER_TABLE}` (`count`, `createdAt`, `updatedAt`) \
             VALUES (DEFAULT, UTC_TIMESTAMP(), UTC_TIMESTAMP())"
        );
        self.execute("insert", &sql).await.map_err(DbError::Query)?;
        Ok(())
    }

    async fn truncate(&self) -> DbResult<()> {
        let sql = format!("TRUNCATE TABLE `{COUNTER_TABLE}`");
        self.execute("truncate", &sql).await.map_err(DbError::Query)?;
        Ok(())
    }
}
