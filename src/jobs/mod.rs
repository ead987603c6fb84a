//! Scheduled Jobs
//!
//! Background jobs for periodic maintenance tasks.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::interval;

use crate::store::{Store, StoreError};

// =========================================================================
// Expired Idempotency Key Deletion Job
// =========================================================================

/// Delete idempotency keys created more than `ttl` ago
pub async fn purge_expired_idempotency_keys(
    store: &dyn Store,
    ttl: chrono::Duration,
) -> Result<u64, JobError> {
    let cutoff = Utc::now() - ttl;

    let mut uow = store.begin().await?;
    let rows_deleted = uow.purge_idempotency_records(cutoff).await?;
    uow.commit().await?;

    if rows_deleted > 0 {
        tracing::info!(
            rows_deleted = rows_deleted,
            cutoff = %cutoff,
            "Deleted expired idempotency keys"
        );
    }

    Ok(rows_deleted)
}

// =========================================================================
// Job Scheduler
// =========================================================================

/// Configuration for job scheduler
#[derive(Debug, Clone)]
pub struct JobSchedulerConfig {
    /// Interval for idempotency key maintenance (default: 10 minutes)
    pub idempotency_maintenance_interval: Duration,
    /// Age after which keys are purged (default: 24 hours)
    pub idempotency_ttl: chrono::Duration,
}

impl Default for JobSchedulerConfig {
    fn default() -> Self {
        Self {
            idempotency_maintenance_interval: Duration::from_secs(600),
            idempotency_ttl: chrono::Duration::hours(24),
        }
    }
}

/// Job Scheduler - runs periodic maintenance tasks
pub struct JobScheduler {
    store: Arc<dyn Store>,
    config: JobSchedulerConfig,
}

impl JobScheduler {
    /// Create a new job scheduler
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            config: JobSchedulerConfig::default(),
        }
    }

    /// Create with custom configuration
    pub fn with_config(store: Arc<dyn Store>, config: JobSchedulerConfig) -> Self {
        Self { store, config }
    }

    /// Start the job scheduler in the background
    /// Returns a handle that can be used to abort the scheduler
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Run the scheduler loop
    async fn run(&self) {
        tracing::info!(
            interval_secs = self.config.idempotency_maintenance_interval.as_secs(),
            "Job scheduler started"
        );

        let mut idempotency_interval = interval(self.config.idempotency_maintenance_interval);

        loop {
            idempotency_interval.tick().await;
            if let Err(e) =
                purge_expired_idempotency_keys(self.store.as_ref(), self.config.idempotency_ttl)
                    .await
            {
                tracing::error!(error = %e, "Idempotency key deletion failed");
            }
        }
    }

    /// Run all maintenance jobs once (for manual trigger or testing)
    pub async fn run_all_once(&self) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();

        match purge_expired_idempotency_keys(self.store.as_ref(), self.config.idempotency_ttl).await
        {
            Ok(count) => report.idempotency_keys_deleted = count,
            Err(e) => report.errors.push(format!("Idempotency deletion: {}", e)),
        }

        report.completed_at = Utc::now();
        report
    }
}

/// Spawn the maintenance loop for `store`
pub fn spawn_maintenance(
    store: Arc<dyn Store>,
    config: JobSchedulerConfig,
) -> tokio::task::JoinHandle<()> {
    JobScheduler::with_config(store, config).start()
}

/// Report from running maintenance jobs
#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    pub idempotency_keys_deleted: u64,
    pub errors: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

/// Job execution errors
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

// =========================================================================
// Tests
// =========================================================================
