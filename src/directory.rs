//! Account directory
//!
//! Profile metadata (holder name, account type) owned by the user-management
//! side of the system. The ledger never depends on it for balances; it is
//! used to enrich balance reads and, when configured, to reject unknown
//! tokens.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use sqlx::PgPool;

use crate::domain::{AccountToken, DomainError};
use crate::error::AppResult;
use crate::store::StoreError;

/// Profile of an account holder
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountProfile {
    pub name: String,
    pub account_type: String,
}

impl AccountProfile {
    pub fn new(name: impl Into<String>, account_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            account_type: account_type.into(),
        }
    }
}

/// Lookup of account profiles by token
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn lookup(&self, token: &AccountToken) -> Result<Option<AccountProfile>, StoreError>;
}

/// Directory backed by the `account_profiles` table
#[derive(Debug, Clone)]
pub struct PgAccountDirectory {
    pool: PgPool,
}

impl PgAccountDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountDirectory for PgAccountDirectory {
    async fn lookup(&self, token: &AccountToken) -> Result<Option<AccountProfile>, StoreError> {
        let row: Option<(String, String)> = sqlx::query_as(
            "SELECT name, account_type FROM account_profiles WHERE account_token = $1",
        )
        .bind(token.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(name, account_type)| AccountProfile { name, account_type }))
    }
}

/// Fixed in-process directory
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    profiles: HashMap<AccountToken, AccountProfile>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(mut self, token: AccountToken, profile: AccountProfile) -> Self {
        self.profiles.insert(token, profile);
        self
    }
}

#[async_trait]
impl AccountDirectory for StaticDirectory {
    async fn lookup(&self, token: &AccountToken) -> Result<Option<AccountProfile>, StoreError> {
        Ok(self.profiles.get(token).cloned())
    }
}

/// Directory as consulted by the services: optional, and only enforcing
/// existence when asked to.
#[derive(Clone, Default)]
pub struct DirectoryPolicy {
    directory: Option<Arc<dyn AccountDirectory>>,
    require_known: bool,
}

impl DirectoryPolicy {
    pub fn new(directory: Arc<dyn AccountDirectory>, require_known: bool) -> Self {
        Self {
            directory: Some(directory),
            require_known,
        }
    }

    /// No directory configured; every token is accepted
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Profile of `token`, failing with `AccountNotFound` when the token is
    /// unknown and known accounts are required.
    pub async fn profile(&self, token: &AccountToken) -> AppResult<Option<AccountProfile>> {
        let Some(directory) = &self.directory else {
            return Ok(None);
        };

        let profile = directory.lookup(token).await?;
        if profile.is_none() && self.require_known {
            tracing::warn!(token = %token, "Rejected unknown account");
            return Err(DomainError::AccountNotFound(token.to_string()).into());
        }
        Ok(profile)
    }
}
