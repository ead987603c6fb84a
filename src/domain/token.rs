//! Account token
//!
//! The card/RFID identifier that keys a prepaid account in the ledger.
//! Tokens are arbitrary-precision non-negative integers; they are kept in
//! canonical decimal form so that `"007"` and `"7"` address the same account.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Longest accepted token, in digits
const MAX_DIGITS: usize = 64;

/// Canonical account token.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountToken(String);

/// Errors that can occur when parsing a token
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("Token is required")]
    Empty,

    #[error("Invalid token format: {0}")]
    NotNumeric(String),

    #[error("Token exceeds {MAX_DIGITS} digits")]
    TooLong,
}

impl AccountToken {
    /// Parse a client-supplied token.
    pub fn parse(raw: &str) -> Result<Self, TokenError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(TokenError::Empty);
        }

        let digits = trimmed.strip_prefix('+').unwrap_or(trimmed);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TokenError::NotNumeric(raw.to_string()));
        }

        let canonical = digits.trim_start_matches('0');
        let canonical = if canonical.is_empty() { "0" } else { canonical };

        if canonical.len() > MAX_DIGITS {
            return Err(TokenError::TooLong);
        }

        Ok(Self(canonical.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AccountToken {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for AccountToken {
    type Error = TokenError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AccountToken> for String {
    fn from(token: AccountToken) -> Self {
        token.0
    }
}
