//! Domain module
//!
//! Core domain types and business logic.

pub mod amount;
pub mod context;
pub mod error;
pub mod item;
pub mod ledger;
pub mod order;
pub mod token;

pub use amount::{
    format_money, serialize_money, Amount, AmountError, Balance, MAX_AMOUNT, MAX_SCALE,
};
pub use context::{Actor, OperationContext};
pub use error::DomainError;
pub use item::Item;
pub use ledger::{
    fold_balance, fold_totals, AccountTotals, EntryId, EntryKind, LedgerEntry, LedgerTotals,
    NewLedgerEntry,
};
pub use order::{NewOrder, Order, OrderLineItem, OrderStatus, PaymentType};
pub use token::{AccountToken, TokenError};
