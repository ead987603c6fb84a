//! Order aggregate
//!
//! An order header plus its line items. Line items snapshot the label and
//! price at the time of sale so historical orders stay stable when the
//! catalog changes.

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ledger::EntryId;
use super::{AccountToken, DomainError};

/// Length of the random part of an order number
const ORDER_SUFFIX_LEN: usize = 6;

/// Order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Preparing,
    Serving,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 4] = [
        OrderStatus::Preparing,
        OrderStatus::Serving,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Preparing => "Preparing",
            OrderStatus::Serving => "Serving",
            OrderStatus::Completed => "Completed",
            OrderStatus::Cancelled => "Cancelled",
        }
    }

    /// Whether the state machine `Preparing -> Serving -> Completed`, with
    /// `Cancelled` reachable from `Preparing` or `Serving`, allows this move.
    /// Staying in the same status is always allowed.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Preparing, Serving)
                | (Serving, Completed)
                | (Preparing, Cancelled)
                | (Serving, Cancelled)
        ) || *self == next
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DomainError::InvalidStatus(s.to_string()))
    }
}

/// How an order is paid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentType {
    /// Paid outside the ledger
    Cash,
    /// Debited from a prepaid account
    Card,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::Cash => "cash",
            PaymentType::Card => "card",
        }
    }

    /// Whether the order total is charged to an account
    pub fn is_account_based(&self) -> bool {
        matches!(self, PaymentType::Card)
    }
}

impl fmt::Display for PaymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cash" => Ok(PaymentType::Cash),
            "card" => Ok(PaymentType::Card),
            other => Err(DomainError::Validation(format!(
                "Unknown payment type: {}",
                other
            ))),
        }
    }
}

/// Persisted order line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineItem {
    pub item_id: i64,
    pub quantity: i64,
    #[serde(serialize_with = "crate::domain::serialize_money")]
    pub unit_price: Decimal,
    pub label: String,
}

impl OrderLineItem {
    /// `None` when the product does not fit in a `Decimal`
    pub fn line_total(&self) -> Option<Decimal> {
        self.unit_price.checked_mul(Decimal::from(self.quantity))
    }
}

/// Persisted order with its lines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: i64,
    pub order_number: String,
    pub payment_type: PaymentType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_token: Option<AccountToken>,
    #[serde(serialize_with = "crate::domain::serialize_money")]
    pub total: Decimal,
    pub status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_entry_id: Option<EntryId>,
    pub lines: Vec<OrderLineItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Order ready to be inserted
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub order_number: String,
    pub payment_type: PaymentType,
    pub account_token: Option<AccountToken>,
    pub total: Decimal,
    pub ledger_entry_id: Option<EntryId>,
    pub lines: Vec<OrderLineItem>,
    pub created_at: DateTime<Utc>,
}

impl NewOrder {
    /// Materialize with a store-assigned id; new orders start `Preparing`
    pub fn into_order(self, id: i64) -> Order {
        Order {
            id,
            order_number: self.order_number,
            payment_type: self.payment_type,
            account_token: self.account_token,
            total: self.total,
            status: OrderStatus::Preparing,
            ledger_entry_id: self.ledger_entry_id,
            lines: self.lines,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

/// Generate an order number such as `ORD-20261018-K3F9QZ`.
pub fn generate_order_number(at: DateTime<Utc>) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ORDER_SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_uppercase())
        .collect();
    format!("ORD-{}-{}", at.format("%Y%m%d"), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_known_values() {
        assert_eq!("Preparing".parse::<OrderStatus>().unwrap(), OrderStatus::Preparing);
        assert_eq!("serving".parse::<OrderStatus>().unwrap(), OrderStatus::Serving);
        assert_eq!(" COMPLETED ".parse::<OrderStatus>().unwrap(), OrderStatus::Completed);
        assert_eq!("Cancelled".parse::<OrderStatus>().unwrap(), OrderStatus::Cancelled);
    }

    #[test]
    fn test_status_parse_rejects_unknown() {
        let err = "Shipped".parse::<OrderStatus>().unwrap_err();
        assert_eq!(err, DomainError::InvalidStatus("Shipped".to_string()));
    }

    #[test]
    fn test_status_state_machine() {
        use OrderStatus::*;
        assert!(Preparing.can_transition_to(Serving));
        assert!(Serving.can_transition_to(Completed));
        assert!(Preparing.can_transition_to(Cancelled));
        assert!(Serving.can_transition_to(Cancelled));
        assert!(Completed.can_transition_to(Completed));

        assert!(!Completed.can_transition_to(Preparing));
        assert!(!Cancelled.can_transition_to(Serving));
        assert!(!Preparing.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Cancelled));
    }

    #[test]
    fn test_payment_type_parse() {
        assert_eq!("Card".parse::<PaymentType>().unwrap(), PaymentType::Card);
        assert_eq!("cash".parse::<PaymentType>().unwrap(), PaymentType::Cash);
        assert!("voucher".parse::<PaymentType>().is_err());
        assert!(PaymentType::Card.is_account_based());
        assert!(!PaymentType::Cash.is_account_based());
    }

    #[test]
    fn test_order_number_format() {
        let at = DateTime::parse_from_rfc3339("2026-10-18T09:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let number = generate_order_number(at);

        assert!(number.starts_with("ORD-20261018-"));
        let suffix = number.rsplit('-').next().unwrap();
        assert_eq!(suffix.len(), ORDER_SUFFIX_LEN);
        assert!(suffix.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_line_total() {
        let line = OrderLineItem {
            item_id: 1,
            quantity: 3,
            unit_price: Decimal::new(250, 2),
            label: "Soda".to_string(),
        };
        assert_eq!(line.line_total(), Some(Decimal::new(750, 2)));
    }

    #[test]
    fn test_line_total_overflow() {
        let line = OrderLineItem {
            item_id: 1,
            quantity: 2,
            unit_price: Decimal::MAX,
            label: "Soda".to_string(),
        };
        assert_eq!(line.line_total(), None);
    }
}
