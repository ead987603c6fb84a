//! In-memory store
//!
//! Keeps the whole dataset behind one `tokio::sync::Mutex`. A unit of work
//! holds the lock for its whole lifetime and works on a private copy of the
//! state, which replaces the shared state on commit. Units are therefore
//! fully serialized and a dropped unit leaves no trace.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{
    Decrement, IdempotencyStore, InventoryStore, LedgerStore, OrderFilter, OrderStore, Store,
    StoreError, UnitOfWork,
};
use crate::domain::{
    fold_totals, AccountToken, AccountTotals, Item, LedgerEntry, LedgerTotals, NewLedgerEntry,
    NewOrder, Order, OrderStatus,
};
use crate::idempotency::IdempotencyRecord;

/// Default bound on waiting for the store lock
const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default)]
struct MemoryState {
    entries: Vec<LedgerEntry>,
    items: BTreeMap<i64, Item>,
    orders: Vec<Order>,
    idempotency: HashMap<Uuid, IdempotencyRecord>,
    last_entry_id: i64,
    last_order_id: i64,
}

/// Store backed by process memory
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
    lock_timeout: Duration,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Seed the store with catalog items
    pub fn with_items(items: impl IntoIterator<Item = Item>) -> Self {
        let mut state = MemoryState::default();
        for item in items {
            state.items.insert(item.id, item);
        }
        Self {
            state: Arc::new(Mutex::new(state)),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Add or replace a catalog item
    pub async fn insert_item(&self, item: Item) {
        self.state.lock().await.items.insert(item.id, item);
    }

    /// Snapshot of a catalog item
    pub async fn item(&self, item_id: i64) -> Option<Item> {
        self.state.lock().await.items.get(&item_id).cloned()
    }

    /// Number of committed orders
    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let guard = tokio::time::timeout(self.lock_timeout, self.state.clone().lock_owned())
            .await
            .map_err(|_| {
                tracing::warn!(
                    timeout_ms = self.lock_timeout.as_millis() as u64,
                    "In-memory store lock wait timed out"
                );
                StoreError::Timeout("in-memory store lock wait".to_string())
            })?;

        let working = MemoryState::clone(&guard);
        Ok(Box::new(MemoryUnitOfWork { guard, working }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Unit of work over a private copy of the state
struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

impl MemoryUnitOfWork {
    fn order_position(&self, order_number: &str) -> Option<usize> {
        self.working
            .orders
            .iter()
            .position(|o| o.order_number == order_number)
    }
}

#[async_trait]
impl LedgerStore for MemoryUnitOfWork {
    async fn lock_account(&mut self, _token: &AccountToken) -> Result<(), StoreError> {
        // The whole store is already held by this unit.
        Ok(())
    }

    async fn append(&mut self, entry: NewLedgerEntry) -> Result<LedgerEntry, StoreError> {
        if self
            .working
            .entries
            .iter()
            .any(|e| e.reference_code == entry.reference_code)
        {
            return Err(StoreError::Conflict(format!(
                "duplicate reference code {}",
                entry.reference_code
            )));
        }

        self.working.last_entry_id += 1;
        let entry = entry.into_entry(self.working.last_entry_id);
        self.working.entries.push(entry.clone());
        Ok(entry)
    }

    async fn entries_for(&mut self, token: &AccountToken) -> Result<Vec<LedgerEntry>, StoreError> {
        Ok(self
            .working
            .entries
            .iter()
            .filter(|e| &e.account_token == token)
            .cloned()
            .collect())
    }

    async fn totals_for(&mut self, token: &AccountToken) -> Result<LedgerTotals, StoreError> {
        Ok(fold_totals(
            self.working
                .entries
                .iter()
                .filter(|e| &e.account_token == token),
        ))
    }

    async fn account_totals(&mut self) -> Result<Vec<AccountTotals>, StoreError> {
        // Canonical tokens have no leading zeros: shorter means smaller
        let mut by_token: BTreeMap<(usize, &str), (AccountToken, Vec<&LedgerEntry>)> =
            BTreeMap::new();
        for entry in &self.working.entries {
            let token = entry.account_token.as_str();
            by_token
                .entry((token.len(), token))
                .or_insert_with(|| (entry.account_token.clone(), Vec::new()))
                .1
                .push(entry);
        }

        Ok(by_token
            .into_values()
            .map(|(account_token, entries)| AccountTotals {
                account_token,
                totals: fold_totals(entries),
            })
            .collect())
    }
}

#[async_trait]
impl InventoryStore for MemoryUnitOfWork {
    async fn find_item(&mut self, item_id: i64) -> Result<Option<Item>, StoreError> {
        Ok(self.working.items.get(&item_id).cloned())
    }

    async fn decrement(&mut self, item_id: i64, quantity: i64) -> Result<Decrement, StoreError> {
        let Some(item) = self.working.items.get_mut(&item_id) else {
            return Ok(Decrement::NotFound);
        };

        if !item.has_stock_for(quantity) {
            return Ok(Decrement::Insufficient {
                available: item.quantity,
            });
        }

        item.quantity -= quantity;
        Ok(Decrement::Applied(item.clone()))
    }
}

#[async_trait]
impl OrderStore for MemoryUnitOfWork {
    async fn order_number_exists(&mut self, order_number: &str) -> Result<bool, StoreError> {
        Ok(self.order_position(order_number).is_some())
    }

    async fn insert_order(&mut self, order: NewOrder) -> Result<Order, StoreError> {
        if self.order_position(&order.order_number).is_some() {
            return Err(StoreError::Conflict(format!(
                "duplicate order number {}",
                order.order_number
            )));
        }

        self.working.last_order_id += 1;
        let order = order.into_order(self.working.last_order_id);
        self.working.orders.push(order.clone());
        Ok(order)
    }

    async fn find_order(&mut self, order_number: &str) -> Result<Option<Order>, StoreError> {
        Ok(self
            .order_position(order_number)
            .map(|i| self.working.orders[i].clone()))
    }

    async fn find_order_for_update(
        &mut self,
        order_number: &str,
    ) -> Result<Option<Order>, StoreError> {
        self.find_order(order_number).await
    }

    async fn set_order_status(
        &mut self,
        order_number: &str,
        status: OrderStatus,
    ) -> Result<Option<Order>, StoreError> {
        let Some(index) = self.order_position(order_number) else {
            return Ok(None);
        };

        let order = &mut self.working.orders[index];
        order.status = status;
        order.updated_at = Utc::now();
        Ok(Some(order.clone()))
    }

    async fn list_orders(&mut self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError> {
        let mut orders: Vec<Order> = self
            .working
            .orders
            .iter()
            .filter(|o| filter.status.map_or(true, |s| o.status == s))
            .cloned()
            .collect();

        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        orders.truncate(filter.limit.max(0) as usize);
        Ok(orders)
    }
}

#[async_trait]
impl IdempotencyStore for MemoryUnitOfWork {
    async fn find_idempotency_record(
        &mut self,
        key: Uuid,
    ) -> Result<Option<IdempotencyRecord>, StoreError> {
        Ok(self.working.idempotency.get(&key).cloned())
    }

    async fn insert_idempotency_record(
        &mut self,
        record: &IdempotencyRecord,
    ) -> Result<(), StoreError> {
        if self.working.idempotency.contains_key(&record.key) {
            return Err(StoreError::Conflict(format!(
                "idempotency key {} already used",
                record.key
            )));
        }
        self.working.idempotency.insert(record.key, record.clone());
        Ok(())
    }

    async fn purge_idempotency_records(
        &mut self,
        older_than: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let before = self.working.idempotency.len();
        self.working
            .idempotency
            .retain(|_, record| record.created_at >= older_than);
        Ok((before - self.working.idempotency.len()) as u64)
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryUnitOfWork { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
