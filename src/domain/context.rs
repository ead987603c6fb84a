//! Operation Context
//!
//! Contains metadata about the current operation for audit and tracing.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who recorded an operation and on whose behalf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    /// Employee the entry is recorded for
    pub employee_id: String,
    /// Operator that processed the entry
    pub username: String,
}

impl Actor {
    pub fn new(employee_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            employee_id: employee_id.into(),
            username: username.into(),
        }
    }

    /// Actor used when a terminal does not identify its operator
    pub fn terminal() -> Self {
        Self::new("pos", "pos")
    }

    /// Both identifiers must be present
    pub fn is_complete(&self) -> bool {
        !self.employee_id.trim().is_empty() && !self.username.trim().is_empty()
    }
}

/// Context for an operation, used for auditing and tracing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationContext {
    /// Correlation ID for request tracing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,

    /// Client-supplied key that makes a write safe to retry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<Uuid>,
}

impl OperationContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Create context with correlation ID
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Create context with idempotency key
    pub fn with_idempotency_key(mut self, key: Uuid) -> Self {
        self.idempotency_key = Some(key);
        self
    }
}
