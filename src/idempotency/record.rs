//! Idempotency records
//!
//! Stored responses keyed by the client's `Idempotency-Key`.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::{StoreError, UnitOfWork};

/// Stored idempotency key information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: Uuid,
    /// Operation the key was first used for (`payment`, `credit`, `order`)
    pub scope: String,
    pub request_hash: String,
    pub response_body: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Idempotency Error
#[derive(Debug, thiserror::Error)]
pub enum IdempotencyError {
    #[error("Request hash mismatch for key {0}")]
    HashMismatch(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Stored response unreadable: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Compute SHA-256 hash of an operation scope and request body
pub fn compute_request_hash(scope: &str, body: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(scope.as_bytes());
    hasher.update([0u8]);
    hasher.update(body);
    hex::encode(hasher.finalize())
}

// =========================================================================
// IdempotencyGuard
// =========================================================================

/// One request's idempotency key together with its fingerprint.
#[derive(Debug, Clone)]
pub struct IdempotencyGuard {
    key: Uuid,
    scope: &'static str,
    request_hash: String,
}

impl IdempotencyGuard {
    /// Fingerprint `request` under `scope`
    pub fn new<T: Serialize>(
        key: Uuid,
        scope: &'static str,
        request: &T,
    ) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(request)?;
        Ok(Self {
            key,
            scope,
            request_hash: compute_request_hash(scope, &body),
        })
    }

    /// Returns the stored response when this key was already used for the
    /// same request, `None` when the key is new.
    pub async fn replay<R: DeserializeOwned>(
        &self,
        uow: &mut dyn UnitOfWork,
    ) -> Result<Option<R>, IdempotencyError> {
        let Some(existing) = uow.find_idempotency_record(self.key).await? else {
            return Ok(None);
        };

        if existing.request_hash != self.request_hash {
            return Err(IdempotencyError::HashMismatch(self.key));
        }

        tracing::info!(
            idempotency_key = %self.key,
            scope = self.scope,
            "Replaying stored response"
        );
        Ok(Some(serde_json::from_value(existing.response_body)?))
    }

    /// Store `response` for this key; commits with the unit.
    pub async fn remember<R: Serialize + Sync>(
        &self,
        uow: &mut dyn UnitOfWork,
        response: &R,
    ) -> Result<(), IdempotencyError> {
        let record = IdempotencyRecord {
            key: self.key,
            scope: self.scope.to_string(),
            request_hash: self.request_hash.clone(),
            response_body: serde_json::to_value(response)?,
            created_at: Utc::now(),
        };
        uow.insert_idempotency_record(&record).await?;
        Ok(())
    }
}
