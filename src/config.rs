//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Which persistence backend serves requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(ConfigError::InvalidValue("STORE_BACKEND")),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(ConfigError::InvalidValue("LOG_FORMAT")),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL (required for the postgres backend)
    pub database_url: Option<String>,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// How long a request waits for a pooled connection
    pub database_acquire_timeout: Duration,

    /// Per-statement limit applied to every pooled connection
    pub database_statement_timeout: Duration,

    pub store_backend: StoreBackend,

    /// Apply `migrations/` on startup
    pub run_migrations: bool,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    pub log_format: LogFormat,

    /// Enforce the Preparing -> Serving -> Completed order lifecycle
    pub strict_order_transitions: bool,

    /// Reject tokens unknown to the account directory
    pub require_known_accounts: bool,

    /// Age after which idempotency keys are purged
    pub idempotency_ttl: chrono::Duration,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T: FromStr>(name: &'static str, default: &str) -> Result<T, ConfigError> {
    var_or(name, default)
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(name))
}

fn parse_flag(name: &'static str) -> Result<bool, ConfigError> {
    match var_or(name, "false").trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue(name)),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            database_max_connections: 10,
            database_acquire_timeout: Duration::from_secs(5),
            database_statement_timeout: Duration::from_millis(5000),
            store_backend: StoreBackend::Memory,
            run_migrations: false,
            host: "127.0.0.1".to_string(),
            port: 3000,
            environment: "development".to_string(),
            log_format: LogFormat::Text,
            strict_order_transitions: false,
            require_known_accounts: false,
            idempotency_ttl: chrono::Duration::hours(24),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.is_empty());

        let store_backend: StoreBackend = parse_var("STORE_BACKEND", "postgres")?;
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingEnv("DATABASE_URL"));
        }

        let database_max_connections = parse_var("DATABASE_MAX_CONNECTIONS", "10")?;
        let acquire_secs: u64 = parse_var("DATABASE_ACQUIRE_TIMEOUT_SECS", "5")?;
        let statement_ms: u64 = parse_var("DATABASE_STATEMENT_TIMEOUT_MS", "5000")?;
        let idempotency_ttl = idempotency_ttl(parse_var("IDEMPOTENCY_TTL_HOURS", "24")?)?;

        Ok(Self {
            database_url,
            database_max_connections,
            database_acquire_timeout: Duration::from_secs(acquire_secs),
            database_statement_timeout: Duration::from_millis(statement_ms),
            store_backend,
            run_migrations: parse_flag("RUN_MIGRATIONS")?,
            host: var_or("HOST", "127.0.0.1"),
            port: parse_var("PORT", "3000")?,
            environment: var_or("ENVIRONMENT", "development"),
            log_format: parse_var("LOG_FORMAT", "text")?,
            strict_order_transitions: parse_flag("STRICT_ORDER_TRANSITIONS")?,
            require_known_accounts: parse_flag("REQUIRE_KNOWN_ACCOUNTS")?,
            idempotency_ttl,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

/// Positive number of hours that `chrono::Duration` can represent
fn idempotency_ttl(hours: i64) -> Result<chrono::Duration, ConfigError> {
    if hours <= 0 {
        return Err(ConfigError::InvalidValue("IDEMPOTENCY_TTL_HOURS"));
    }
    chrono::Duration::try_hours(hours).ok_or(ConfigError::InvalidValue("IDEMPOTENCY_TTL_HOURS"))
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_parse() {
        assert_eq!("postgres".parse::<StoreBackend>().unwrap(), StoreBackend::Postgres);
        assert_eq!("Memory".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert!("sqlite".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("TEXT".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_idempotency_ttl_bounds() {
        assert_eq!(idempotency_ttl(24).unwrap(), chrono::Duration::hours(24));
        assert!(matches!(idempotency_ttl(0), Err(ConfigError::InvalidValue(_))));
        assert!(matches!(idempotency_ttl(-5), Err(ConfigError::InvalidValue(_))));
        assert!(matches!(idempotency_ttl(i64::MAX), Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.database_max_connections, 10);
        assert!(!config.strict_order_transitions);
        assert_eq!(config.idempotency_ttl, chrono::Duration::hours(24));
        assert!(!config.is_production());
    }
}
