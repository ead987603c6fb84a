//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use rust_decimal::Decimal;
use thiserror::Error;

use super::order::OrderStatus;

/// Domain-specific errors
///
/// These errors represent business rule violations and domain invariant failures.
/// They are independent of the web/infrastructure layer.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Account token could not be parsed
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Invalid amount (zero, negative, too precise, or exceeds limit)
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Debit would take the balance below zero
    #[error("Insufficient credit: required {required_amount}, available {current_balance}")]
    InsufficientFunds {
        current_balance: Decimal,
        required_amount: Decimal,
    },

    /// Decrement would take an item's stock below zero
    #[error("Insufficient stock for item {item_id}: requested {requested}, available {available}")]
    InsufficientStock {
        item_id: i64,
        available: i64,
        requested: i64,
    },

    /// Order submitted without line items
    #[error("Order must contain at least one line item")]
    EmptyOrder,

    /// Status value outside the known set
    #[error("Invalid order status: {0}")]
    InvalidStatus(String),

    /// Status change not allowed from the current status
    #[error("Cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// Account not known to the account directory
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Catalog item not found
    #[error("Item not found: {0}")]
    ItemNotFound(i64),

    /// Order not found
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// Any other malformed input
    #[error("{0}")]
    Validation(String),
}

impl DomainError {
    /// Create an insufficient funds error
    pub fn insufficient_funds(current_balance: Decimal, required_amount: Decimal) -> Self {
        Self::InsufficientFunds {
            current_balance,
            required_amount,
        }
    }

    /// Create an insufficient stock error
    pub fn insufficient_stock(item_id: i64, available: i64, requested: i64) -> Self {
        Self::InsufficientStock {
            item_id,
            available,
            requested,
        }
    }

    /// Check if this is a client error (user's fault)
    pub fn is_client_error(&self) -> bool {
        !self.is_not_found()
    }

    /// Check if this error reports a missing account, item or order
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::AccountNotFound(_) | Self::ItemNotFound(_) | Self::OrderNotFound(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_funds_error() {
        let err = DomainError::insufficient_funds(Decimal::new(0, 2), Decimal::new(1, 2));

        assert!(err.is_client_error());
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("0.01"));
    }

    #[test]
    fn test_insufficient_stock_error() {
        let err = DomainError::insufficient_stock(7, 2, 3);
        assert_eq!(
            err.to_string(),
            "Insufficient stock for item 7: requested 3, available 2"
        );
    }

    #[test]
    fn test_not_found_errors() {
        assert!(DomainError::OrderNotFound("ORD-1".to_string()).is_not_found());
        assert!(DomainError::ItemNotFound(1).is_not_found());
        assert!(!DomainError::EmptyOrder.is_not_found());
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = DomainError::InvalidTransition {
            from: OrderStatus::Completed,
            to: OrderStatus::Preparing,
        };
        assert_eq!(err.to_string(), "Cannot move order from Completed to Preparing");
    }
}
