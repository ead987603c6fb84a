//! Database module
//!
//! Connection pool, migrations and schema verification.

use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};

use crate::config::Config;
use crate::config::ConfigError;

/// Tables the service reads or writes
const REQUIRED_TABLES: [&str; 6] = [
    "ledger_entries",
    "items",
    "orders",
    "order_line_items",
    "idempotency_keys",
    "account_profiles",
];

/// Open a pool whose connections carry a `statement_timeout`
pub async fn connect_pool(config: &Config) -> Result<PgPool, sqlx::Error> {
    let database_url = config
        .database_url
        .as_deref()
        .ok_or_else(|| sqlx::Error::Configuration(Box::new(ConfigError::MissingEnv("DATABASE_URL"))))?;

    let statement_timeout_ms = config.database_statement_timeout.as_millis() as u64;

    PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .acquire_timeout(config.database_acquire_timeout)
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                conn.execute(format!("SET statement_timeout = {}", statement_timeout_ms).as_str())
                    .await?;
                Ok(())
            })
        })
        .connect(database_url)
        .await
}

/// Simple connectivity check
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply the SQL files under `migrations/`
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database migrations applied");
    Ok(())
}

/// Check if required tables exist
pub async fn check_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    for table in REQUIRED_TABLES {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required table '{}' does not exist", table);
            return Ok(false);
        }
    }

    Ok(true)
}
