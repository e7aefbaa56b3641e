use crate::error::{AppError, Result};

/// Database the counter table lives in. Not configurable.
pub const DB_NAME: &str = "nodejs_demo";

/// Table backing the counter. One row per increment.
pub const COUNTER_TABLE: &str = "Counters";

pub const DEFAULT_PORT: u16 = 80;
pub const DEFAULT_MYSQL_HOST: &str = "localhost";
pub const DEFAULT_MYSQL_PORT: u16 = 3306;

/// Interval between initialization retries while the database is down (seconds).
pub const RECONNECT_INTERVAL_SECS: u64 = 30;

/// Connection pool limits.
pub mod pool {
    pub const MAX_CONNECTIONS: u32 = 5;
    pub const MIN_CONNECTIONS: u32 = 0;
    pub const ACQUIRE_TIMEOUT_SECS: u64 = 30;
    pub const IDLE_TIMEOUT_SECS: u64 = 10;
}

/// Total attempts (first try included) for an operation failing with a
/// transient connection error.
pub const DB_RETRY_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub log_level: String,
    pub db: DbConfig,
}

/// Credentials and address of the MySQL server (MYSQL_USERNAME, MYSQL_PASSWORD, MYSQL_ADDRESS).
#[derive(Clone)]
pub struct DbConfig {
    pub username: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    /// Raw MYSQL_ADDRESS as supplied, for logging.
    pub address: String,
}

impl std::fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConfig")
            .field("username", &self.username)
            .field("has_password", &!self.password.is_empty())
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            port: std::env::var("PORT")
                .unwrap_or_else(|_| DEFAULT_PORT.to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("PORT must be a valid port number".to_string()))?,
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db: DbConfig::from_parts(
                std::env::var("MYSQL_USERNAME").unwrap_or_default(),
                std::env::var("MYSQL_PASSWORD").unwrap_or_default(),
                std::env::var("MYSQL_ADDRESS").unwrap_or_default(),
            )?,
        })
    }
}

impl DbConfig {
    /// Splits `address` into host and port. Missing parts fall back to
    /// localhost:3306.
    pub fn from_parts(username: String, password: String, address: String) -> Result<Self> {
        let (host, port) = match address.split_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (address.as_str(), None),
        };
        let host = match host.trim() {
            "" => DEFAULT_MYSQL_HOST.to_string(),
            h => h.to_string(),
        };
        let port = match port.map(str::trim) {
            None | Some("") => DEFAULT_MYSQL_PORT,
            Some(p) => p.parse::<u16>().map_err(|_| {
                AppError::Config(format!("MYSQL_ADDRESS has an invalid port: {p:?}"))
            })?,
        };

        Ok(Self { username, password, host, port, address })
    }
}
