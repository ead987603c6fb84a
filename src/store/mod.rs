//! Store module
//!
//! Persistence seam for the ledger, inventory, orders and idempotency keys.
//!
//! Every operation runs inside a [`UnitOfWork`] obtained from [`Store::begin`].
//! Writes become visible to other units only after [`UnitOfWork::commit`];
//! dropping a unit without committing rolls everything back, which is also
//! what happens when a request is cancelled mid-flight.
//!
//! Two backends implement the seam: [`PgStore`] (production) and
//! [`InMemoryStore`] (tests and local development).

mod error;
mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    AccountToken, AccountTotals, Item, LedgerEntry, LedgerTotals, NewLedgerEntry, NewOrder,
    Order, OrderStatus,
};
use crate::idempotency::IdempotencyRecord;

pub use error::StoreError;
pub use memory::InMemoryStore;
pub use postgres::PgStore;

/// Outcome of a guarded stock decrement
#[derive(Debug, Clone, PartialEq)]
pub enum Decrement {
    /// Stock was reduced; the item carries the new quantity
    Applied(Item),
    /// Not enough stock; nothing changed
    Insufficient { available: i64 },
    /// No such item
    NotFound,
}

/// Filter for order listings
#[derive(Debug, Clone, PartialEq)]
pub struct OrderFilter {
    pub limit: i64,
    pub status: Option<OrderStatus>,
}

impl Default for OrderFilter {
    fn default() -> Self {
        Self {
            limit: 100,
            status: None,
        }
    }
}

/// Append-only ledger of credit/debit entries keyed by account token.
#[async_trait]
pub trait LedgerStore: Send {
    /// Serialize this unit against every other unit that locks the same
    /// account, until commit or rollback.
    async fn lock_account(&mut self, token: &AccountToken) -> Result<(), StoreError>;

    /// Append an entry. Entries are never updated or deleted.
    async fn append(&mut self, entry: NewLedgerEntry) -> Result<LedgerEntry, StoreError>;

    /// All entries of an account in chronological order.
    async fn entries_for(&mut self, token: &AccountToken) -> Result<Vec<LedgerEntry>, StoreError>;

    /// Credit and debit sums of an account.
    async fn totals_for(&mut self, token: &AccountToken) -> Result<LedgerTotals, StoreError>;

    /// Sums for every account present in the ledger, in numeric token order.
    async fn account_totals(&mut self) -> Result<Vec<AccountTotals>, StoreError>;
}

/// Per-item stock counters.
#[async_trait]
pub trait InventoryStore: Send {
    async fn find_item(&mut self, item_id: i64) -> Result<Option<Item>, StoreError>;

    /// Reduce stock by `quantity` unless that would take it below zero.
    /// Holds the item's row lock until the unit ends.
    async fn decrement(&mut self, item_id: i64, quantity: i64) -> Result<Decrement, StoreError>;
}

/// Order headers and their line items.
#[async_trait]
pub trait OrderStore: Send {
    async fn order_number_exists(&mut self, order_number: &str) -> Result<bool, StoreError>;

    /// Insert the header and all lines. New orders start `Preparing`.
    async fn insert_order(&mut self, order: NewOrder) -> Result<Order, StoreError>;

    async fn find_order(&mut self, order_number: &str) -> Result<Option<Order>, StoreError>;

    /// Like `find_order`, also locking the header until the unit ends.
    async fn find_order_for_update(
        &mut self,
        order_number: &str,
    ) -> Result<Option<Order>, StoreError>;

    async fn set_order_status(
        &mut self,
        order_number: &str,
        status: OrderStatus,
    ) -> Result<Option<Order>, StoreError>;

    /// Orders newest first.
    async fn list_orders(&mut self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError>;
}

/// Responses remembered per idempotency key.
#[async_trait]
pub trait IdempotencyStore: Send {
    async fn find_idempotency_record(
        &mut self,
        key: Uuid,
    ) -> Result<Option<IdempotencyRecord>, StoreError>;

    /// Fails with `StoreError::Conflict` if the key is already taken.
    async fn insert_idempotency_record(
        &mut self,
        record: &IdempotencyRecord,
    ) -> Result<(), StoreError>;

    async fn purge_idempotency_records(
        &mut self,
        older_than: DateTime<Utc>,
    ) -> Result<u64, StoreError>;
}

/// One atomic unit: everything written through it commits together or not
/// at all.
#[async_trait]
pub trait UnitOfWork: LedgerStore + InventoryStore + OrderStore + IdempotencyStore {
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Factory for units of work.
#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError>;

    /// Cheap connectivity check
    async fn ping(&self) -> Result<(), StoreError>;
}
