//! posLedger - Point-of-sale Backend API
//!
//! Prepaid-card ledger and order fulfillment engine. Balances are derived
//! from an append-only ledger; orders charge the ledger and decrement stock
//! in a single unit of work.

use std::net::SocketAddr;
use std::sync::Arc;

use pos_ledger::api::{self, AppState};
use pos_ledger::config::{LogFormat, StoreBackend};
use pos_ledger::directory::{DirectoryPolicy, PgAccountDirectory};
use pos_ledger::jobs::{self, JobSchedulerConfig};
use pos_ledger::store::{InMemoryStore, PgStore, Store};
use pos_ledger::{db, Config};
use sqlx::PgPool;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging
fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "pos_ledger=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Connect, optionally migrate, and verify the schema
async fn connect_database(config: &Config) -> anyhow::Result<PgPool> {
    tracing::info!("Connecting to database...");
    let pool = db::connect_pool(config).await?;
    db::verify_connection(&pool).await?;

    if config.run_migrations {
        db::run_migrations(&pool).await?;
    }

    if !db::check_schema(&pool).await? {
        tracing::error!("Database schema is not complete. Please run migrations.");
        return Err(anyhow::anyhow!("Database schema incomplete"));
    }

    tracing::info!("Database connected successfully");
    Ok(pool)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(config.log_format);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!(
        environment = %config.environment,
        backend = ?config.store_backend,
        "Starting posLedger server"
    );

    let (store, directory, pool): (Arc<dyn Store>, DirectoryPolicy, Option<PgPool>) =
        match config.store_backend {
            StoreBackend::Postgres => {
                let pool = connect_database(&config).await?;
                let directory = DirectoryPolicy::new(
                    Arc::new(PgAccountDirectory::new(pool.clone())),
                    config.require_known_accounts,
                );
                (Arc::new(PgStore::new(pool.clone())), directory, Some(pool))
            }
            StoreBackend::Memory => {
                if config.is_production() {
                    tracing::warn!("In-memory store selected; data is lost on restart");
                }
                (Arc::new(InMemoryStore::new()), DirectoryPolicy::disabled(), None)
            }
        };

    let maintenance = jobs::spawn_maintenance(
        store.clone(),
        JobSchedulerConfig {
            idempotency_ttl: config.idempotency_ttl,
            ..JobSchedulerConfig::default()
        },
    );

    let state = AppState::new(store, directory, config.strict_order_transitions);
    let app = api::build_router(state);

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Cleanup
    tracing::info!("Server shutting down...");
    maintenance.abort();
    if let Some(pool) = pool {
        pool.close().await;
        tracing::info!("Database connections closed. Goodbye!");
    }

    Ok(())
}

/// Shutdown signal handler for graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
