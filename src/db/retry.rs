//! Retry of transient connection-level failures.

use std::future::Future;
use std::io::ErrorKind;
use std::time::Duration;

use tracing::warn;

use crate::config::DB_RETRY_MAX_ATTEMPTS;

/// Delay before each retry, indexed by retry number.
const RETRY_BACKOFF_MS: &[u64] = &[100, 110];

/// True for failures worth retrying: the connection never came up or dropped
/// underneath us. Anything the server answered with (bad SQL, access denied)
/// is permanent.
pub fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Io(io) => match io.kind() {
            ErrorKind::TimedOut
            | ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::NotConnected
            | ErrorKind::AddrNotAvailable
            | ErrorKind::UnexpectedEof => true,
            // DNS failures and unreachable hosts surface without a stable kind.
            _ => {
                let msg = io.to_string().to_ascii_lowercase();
                msg.contains("lookup") || msg.contains("unreachable")
            }
        },
        // SQLSTATE class 08: connection exception.
        sqlx::Error::Database(db) => db.code().is_some_and(|c| c.starts_with("08")),
        _ => false,
    }
}

/// Run `f` up to `DB_RETRY_MAX_ATTEMPTS` times while it fails transiently.
pub async fn with_retry<T, F, Fut>(op: &str, mut f: F) -> Result<T, sqlx::Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    let mut attempt = 1u32;
    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < DB_RETRY_MAX_ATTEMPTS && is_transient(&e) => {
                let delay_ms = RETRY_BACKOFF_MS
                    .get(attempt as usize - 1)
                    .or(RETRY_BACKOFF_MS.last())
                    .copied()
                    .unwrap_or_default();
                warn!(op, attempt, "Transient database error, retrying in {delay_ms}ms: {e}");
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
