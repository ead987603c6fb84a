//! Command definitions
//!
//! Commands represent intentions to change the system state. They carry
//! already-validated domain types; parsing raw input happens at the HTTP
//! edge.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::directory::AccountProfile;
use crate::domain::{
    AccountToken, Actor, Amount, EntryId, LedgerEntry, Order, OrderStatus, PaymentType,
};

// =========================================================================
// CreditCommand
// =========================================================================

/// Command to top up an account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditCommand {
    pub token: AccountToken,
    pub amount: Amount,
    pub actor: Actor,
}

impl CreditCommand {
    pub fn new(token: AccountToken, amount: Amount, actor: Actor) -> Self {
        Self {
            token,
            amount,
            actor,
        }
    }
}

// =========================================================================
// DebitCommand
// =========================================================================

/// Command to charge an account for a purchase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebitCommand {
    pub token: AccountToken,
    pub amount: Amount,
    pub actor: Actor,
    /// Product label recorded on the entry
    pub label: Option<String>,
    pub quantity: Option<Decimal>,
}

impl DebitCommand {
    pub fn new(token: AccountToken, amount: Amount, actor: Actor) -> Self {
        Self {
            token,
            amount,
            actor,
            label: None,
            quantity: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_quantity(mut self, quantity: Decimal) -> Self {
        self.quantity = Some(quantity);
        self
    }
}

/// Result of a credit or debit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResult {
    pub token: AccountToken,
    #[serde(serialize_with = "crate::domain::serialize_money")]
    pub new_balance: Decimal,
    pub transaction_id: EntryId,
    pub reference_code: String,
}

// =========================================================================
// CreateOrderCommand
// =========================================================================

/// Requested order line; price and label fall back to the catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLineRequest {
    pub item_id: i64,
    pub quantity: i64,
    pub unit_price: Option<Decimal>,
    pub label: Option<String>,
}

impl OrderLineRequest {
    pub fn new(item_id: i64, quantity: i64) -> Self {
        Self {
            item_id,
            quantity,
            unit_price: None,
            label: None,
        }
    }

    pub fn with_price(mut self, unit_price: Decimal) -> Self {
        self.unit_price = Some(unit_price);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Command to create an order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderCommand {
    pub lines: Vec<OrderLineRequest>,
    pub payment_type: PaymentType,
    /// Required when `payment_type` is account based
    pub token: Option<AccountToken>,
    pub total: Decimal,
    pub actor: Actor,
}

impl CreateOrderCommand {
    pub fn new(lines: Vec<OrderLineRequest>, payment_type: PaymentType, total: Decimal) -> Self {
        Self {
            lines,
            payment_type,
            token: None,
            total,
            actor: Actor::terminal(),
        }
    }

    pub fn with_token(mut self, token: AccountToken) -> Self {
        self.token = Some(token);
        self
    }

    pub fn with_actor(mut self, actor: Actor) -> Self {
        self.actor = actor;
        self
    }
}

/// Result of a successful order creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResult {
    pub order_number: String,
    pub order: Order,
}

/// Command to move an order to another status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateOrderStatusCommand {
    pub order_number: String,
    pub status: OrderStatus,
}

// =========================================================================
// Reads
// =========================================================================

/// Current balance of one account
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceView {
    pub token: AccountToken,
    #[serde(serialize_with = "crate::domain::serialize_money")]
    pub balance: Decimal,
    #[serde(flatten)]
    pub profile: Option<AccountProfile>,
}

/// Balance line in the per-account listing
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountBalance {
    pub token: AccountToken,
    #[serde(serialize_with = "crate::domain::serialize_money")]
    pub total_credit: Decimal,
    #[serde(serialize_with = "crate::domain::serialize_money")]
    pub total_debit: Decimal,
    #[serde(serialize_with = "crate::domain::serialize_money")]
    pub balance: Decimal,
    pub entry_count: i64,
}

/// Chronological ledger of one account
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountHistory {
    pub token: AccountToken,
    #[serde(serialize_with = "crate::domain::serialize_money")]
    pub balance: Decimal,
    pub entries: Vec<LedgerEntry>,
}
