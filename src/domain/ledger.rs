//! Ledger entries
//!
//! Immutable credit/debit records. An account's balance is the signed sum of
//! its entries; nothing else about an account is stored here.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountToken, Actor, Amount, Balance};

/// Identifier assigned by the ledger store on append
pub type EntryId = i64;

/// Direction of a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Credit,
    Debit,
}

impl EntryKind {
    /// Prefix of the entry's reference code
    pub fn reference_prefix(&self) -> &'static str {
        match self {
            EntryKind::Credit => "TOPUP",
            EntryKind::Debit => "PAY",
        }
    }

    /// Default product type recorded with the entry
    pub fn product_type(&self) -> &'static str {
        match self {
            EntryKind::Credit => "Top Up",
            EntryKind::Debit => "POS Payment",
        }
    }

    /// Default label recorded with the entry
    pub fn default_label(&self) -> &'static str {
        match self {
            EntryKind::Credit => "Account Top Up",
            EntryKind::Debit => "POS Purchase",
        }
    }
}

/// A persisted ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: EntryId,
    pub account_token: AccountToken,
    #[serde(serialize_with = "crate::domain::serialize_money")]
    pub credit: Decimal,
    #[serde(serialize_with = "crate::domain::serialize_money")]
    pub debit: Decimal,
    pub reference_code: String,
    pub employee_id: String,
    pub username: String,
    pub processed_by: String,
    pub product_type: String,
    pub product_name: String,
    pub quantity: Decimal,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn kind(&self) -> EntryKind {
        if self.credit > Decimal::ZERO {
            EntryKind::Credit
        } else {
            EntryKind::Debit
        }
    }
}

/// An entry ready to be appended (no id yet).
#[derive(Debug, Clone, PartialEq)]
pub struct NewLedgerEntry {
    pub account_token: AccountToken,
    pub kind: EntryKind,
    pub amount: Amount,
    pub reference_code: String,
    pub employee_id: String,
    pub username: String,
    pub processed_by: String,
    pub product_type: String,
    pub product_name: String,
    pub quantity: Decimal,
    pub created_at: DateTime<Utc>,
}

impl NewLedgerEntry {
    /// Build an entry with the default product type and label for its kind.
    pub fn new(token: AccountToken, kind: EntryKind, amount: Amount, actor: &Actor) -> Self {
        let created_at = Utc::now();
        Self {
            account_token: token,
            kind,
            amount,
            reference_code: reference_code(kind, created_at),
            employee_id: actor.employee_id.clone(),
            username: actor.username.clone(),
            processed_by: actor.username.clone(),
            product_type: kind.product_type().to_string(),
            product_name: kind.default_label().to_string(),
            quantity: Decimal::ONE,
            created_at,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.product_name = label.into();
        self
    }

    pub fn with_quantity(mut self, quantity: Decimal) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn credit(&self) -> Decimal {
        match self.kind {
            EntryKind::Credit => self.amount.value(),
            EntryKind::Debit => Decimal::ZERO,
        }
    }

    pub fn debit(&self) -> Decimal {
        match self.kind {
            EntryKind::Credit => Decimal::ZERO,
            EntryKind::Debit => self.amount.value(),
        }
    }

    /// Materialize with a store-assigned id
    pub fn into_entry(self, id: EntryId) -> LedgerEntry {
        LedgerEntry {
            id,
            credit: self.credit(),
            debit: self.debit(),
            account_token: self.account_token,
            reference_code: self.reference_code,
            employee_id: self.employee_id,
            username: self.username,
            processed_by: self.processed_by,
            product_type: self.product_type,
            product_name: self.product_name,
            quantity: self.quantity,
            created_at: self.created_at,
        }
    }
}

/// Human-auditable, unique reference code, e.g. `PAY-20261018093015-1f2e3d4c`.
pub fn reference_code(kind: EntryKind, at: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}-{}",
        kind.reference_prefix(),
        at.format("%Y%m%d%H%M%S"),
        &suffix[..8]
    )
}

/// Credit and debit sums for one account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LedgerTotals {
    pub credit: Decimal,
    pub debit: Decimal,
    pub entry_count: i64,
}

impl LedgerTotals {
    pub fn balance(&self) -> Balance {
        Balance::from_totals(self.credit, self.debit)
    }

    fn add(mut self, entry: &LedgerEntry) -> Self {
        self.credit += entry.credit;
        self.debit += entry.debit;
        self.entry_count += 1;
        self
    }
}

/// Totals for one account, as listed across the ledger
#[derive(Debug, Clone, PartialEq)]
pub struct AccountTotals {
    pub account_token: AccountToken,
    pub totals: LedgerTotals,
}

/// Sum a sequence of entries. Order does not matter.
pub fn fold_totals<'a, I>(entries: I) -> LedgerTotals
where
    I: IntoIterator<Item = &'a LedgerEntry>,
{
    entries
        .into_iter()
        .fold(LedgerTotals::default(), LedgerTotals::add)
}

/// `sum(credit) - sum(debit)` over the entries.
pub fn fold_balance<'a, I>(entries: I) -> Balance
where
    I: IntoIterator<Item = &'a LedgerEntry>,
{
    fold_totals(entries).balance()
}
