use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Failures of the persistence layer, split by the stage that produced them.
#[derive(Debug, Error)]
pub enum DbError {
    /// Could not reach or authenticate against the database. Transient kinds
    /// are retried before this surfaces.
    #[error("Database connection error: {0}")]
    Connection(#[source] sqlx::Error),

    /// The counter table could not be created or altered.
    #[error("Database schema error: {0}")]
    Schema(#[source] sqlx::Error),

    #[error("Database query error: {0}")]
    Query(#[source] sqlx::Error),
}

pub type DbResult<T> = std::result::Result<T, DbError>;
