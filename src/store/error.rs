//! Store Errors
//!
//! Error types for ledger, inventory and order persistence.

/// PostgreSQL error codes the store gives special meaning to
const UNIQUE_VIOLATION: &str = "23505";
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const QUERY_CANCELED: &str = "57014";
const LOCK_NOT_AVAILABLE: &str = "55P03";

/// Errors that can occur in the store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Connection, statement or lock wait exceeded its deadline
    #[error("Storage timeout: {0}")]
    Timeout(String),

    /// Write lost against a concurrent unit of work (unique key, deadlock,
    /// serialization failure)
    #[error("Storage conflict: {0}")]
    Conflict(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored data violates an invariant the schema should have enforced
    #[error("Corrupt data: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        if matches!(error, sqlx::Error::PoolTimedOut) {
            return StoreError::Timeout("connection pool exhausted".to_string());
        }

        let classified = error.as_database_error().and_then(|db| {
            let message = db.message().to_string();
            match db.code().as_deref() {
                Some(QUERY_CANCELED) | Some(LOCK_NOT_AVAILABLE) => Some(StoreError::Timeout(message)),
                Some(UNIQUE_VIOLATION) | Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED) => {
                    Some(StoreError::Conflict(message))
                }
                _ => None,
            }
        });

        classified.unwrap_or(StoreError::Database(error))
    }
}
