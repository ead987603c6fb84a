//! PostgreSQL store
//!
//! Each unit of work is one database transaction. Account operations are
//! serialized with transaction-scoped advisory locks keyed by the account
//! token; stock decrements rely on the row lock taken by a guarded
//! `UPDATE`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use super::{
    Decrement, IdempotencyStore, InventoryStore, LedgerStore, OrderFilter, OrderStore, Store,
    StoreError, UnitOfWork,
};
use crate::domain::{
    AccountToken, AccountTotals, Item, LedgerEntry, LedgerTotals, NewLedgerEntry, NewOrder,
    Order, OrderLineItem, OrderStatus,
};
use crate::idempotency::IdempotencyRecord;

const ENTRY_COLUMNS: &str = "id, account_token, credit, debit, reference_code, employee_id, \
     username, processed_by, product_type, product_name, quantity, created_at";

const ORDER_COLUMNS: &str = "id, order_number, payment_type, account_token, total, status, \
     ledger_entry_id, created_at, updated_at";

/// Store backed by a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Unit of work over one transaction; rolled back when dropped uncommitted
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

// =========================================================================
// Row mapping
// =========================================================================

fn parse_token(raw: &str) -> Result<AccountToken, StoreError> {
    AccountToken::parse(raw)
        .map_err(|e| StoreError::Corrupt(format!("stored account token {:?}: {}", raw, e)))
}

fn entry_from_row(row: &PgRow) -> Result<LedgerEntry, StoreError> {
    let token: String = row.try_get("account_token")?;
    Ok(LedgerEntry {
        id: row.try_get("id")?,
        account_token: parse_token(&token)?,
        credit: row.try_get("credit")?,
        debit: row.try_get("debit")?,
        reference_code: row.try_get("reference_code")?,
        employee_id: row.try_get("employee_id")?,
        username: row.try_get("username")?,
        processed_by: row.try_get("processed_by")?,
        product_type: row.try_get("product_type")?,
        product_name: row.try_get("product_name")?,
        quantity: row.try_get("quantity")?,
        created_at: row.try_get("created_at")?,
    })
}

fn item_from_row(row: &PgRow) -> Result<Item, StoreError> {
    Ok(Item {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        price: row.try_get("price")?,
        quantity: row.try_get("quantity")?,
    })
}

fn order_from_row(row: &PgRow, lines: Vec<OrderLineItem>) -> Result<Order, StoreError> {
    let payment_type: String = row.try_get("payment_type")?;
    let status: String = row.try_get("status")?;
    let token: Option<String> = row.try_get("account_token")?;

    Ok(Order {
        id: row.try_get("id")?,
        order_number: row.try_get("order_number")?,
        payment_type: payment_type
            .parse()
            .map_err(|_| StoreError::Corrupt(format!("payment type {:?}", payment_type)))?,
        account_token: token.as_deref().map(parse_token).transpose()?,
        total: row.try_get("total")?,
        status: status
            .parse()
            .map_err(|_| StoreError::Corrupt(format!("order status {:?}", status)))?,
        ledger_entry_id: row.try_get("ledger_entry_id")?,
        lines,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn line_from_row(row: &PgRow) -> Result<OrderLineItem, StoreError> {
    Ok(OrderLineItem {
        item_id: row.try_get("item_id")?,
        quantity: row.try_get("quantity")?,
        unit_price: row.try_get("unit_price")?,
        label: row.try_get("label")?,
    })
}

impl PgUnitOfWork {
    async fn lines_for(&mut self, order_id: i64) -> Result<Vec<OrderLineItem>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT item_id, quantity, unit_price, label
            FROM order_line_items
            WHERE order_id = $1
            ORDER BY position
            "#,
        )
        .bind(order_id)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter().map(line_from_row).collect()
    }

    async fn load_order(&mut self, row: Option<PgRow>) -> Result<Option<Order>, StoreError> {
        let Some(row) = row else {
            return Ok(None);
        };
        let id: i64 = row.try_get("id")?;
        let lines = self.lines_for(id).await?;
        order_from_row(&row, lines).map(Some)
    }
}

// =========================================================================
// LedgerStore
// =========================================================================

#[async_trait]
impl LedgerStore for PgUnitOfWork {
    async fn lock_account(&mut self, token: &AccountToken) -> Result<(), StoreError> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(token.as_str())
            .execute(&mut *self.tx)
            .await?;

        tracing::debug!(token = %token, "Account lock acquired");
        Ok(())
    }

    async fn append(&mut self, entry: NewLedgerEntry) -> Result<LedgerEntry, StoreError> {
        let query = format!(
            r#"
            INSERT INTO ledger_entries (
                account_token, credit, debit, reference_code, employee_id,
                username, processed_by, product_type, product_name, quantity, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {}
            "#,
            ENTRY_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(entry.account_token.as_str())
            .bind(entry.credit())
            .bind(entry.debit())
            .bind(&entry.reference_code)
            .bind(&entry.employee_id)
            .bind(&entry.username)
            .bind(&entry.processed_by)
            .bind(&entry.product_type)
            .bind(&entry.product_name)
            .bind(entry.quantity)
            .bind(entry.created_at)
            .fetch_one(&mut *self.tx)
            .await?;

        entry_from_row(&row)
    }

    async fn entries_for(&mut self, token: &AccountToken) -> Result<Vec<LedgerEntry>, StoreError> {
        let query = format!(
            "SELECT {} FROM ledger_entries WHERE account_token = $1 ORDER BY created_at, id",
            ENTRY_COLUMNS
        );

        let rows = sqlx::query(&query)
            .bind(token.as_str())
            .fetch_all(&mut *self.tx)
            .await?;

        rows.iter().map(entry_from_row).collect()
    }

    async fn totals_for(&mut self, token: &AccountToken) -> Result<LedgerTotals, StoreError> {
        let (credit, debit, entry_count): (rust_decimal::Decimal, rust_decimal::Decimal, i64) =
            sqlx::query_as(
                r#"
                SELECT COALESCE(SUM(credit), 0), COALESCE(SUM(debit), 0), COUNT(*)
                FROM ledger_entries
                WHERE account_token = $1
                "#,
            )
            .bind(token.as_str())
            .fetch_one(&mut *self.tx)
            .await?;

        Ok(LedgerTotals {
            credit,
            debit,
            entry_count,
        })
    }

    async fn account_totals(&mut self) -> Result<Vec<AccountTotals>, StoreError> {
        let rows: Vec<(String, rust_decimal::Decimal, rust_decimal::Decimal, i64)> =
            sqlx::query_as(
                r#"
                SELECT account_token, SUM(credit), SUM(debit), COUNT(*)
                FROM ledger_entries
                GROUP BY account_token
                ORDER BY length(account_token), account_token
                "#,
            )
            .fetch_all(&mut *self.tx)
            .await?;

        rows.into_iter()
            .map(|(token, credit, debit, entry_count)| {
                Ok(AccountTotals {
                    account_token: parse_token(&token)?,
                    totals: LedgerTotals {
                        credit,
                        debit,
                        entry_count,
                    },
                })
            })
            .collect()
    }
}

// =========================================================================
// InventoryStore
// =========================================================================

#[async_trait]
impl InventoryStore for PgUnitOfWork {
    async fn find_item(&mut self, item_id: i64) -> Result<Option<Item>, StoreError> {
        let row = sqlx::query("SELECT id, name, price, quantity FROM items WHERE id = $1")
            .bind(item_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        row.as_ref().map(item_from_row).transpose()
    }

    async fn decrement(&mut self, item_id: i64, quantity: i64) -> Result<Decrement, StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE items
            SET quantity = quantity - $2, updated_at = NOW()
            WHERE id = $1 AND quantity >= $2
            RETURNING id, name, price, quantity
            "#,
        )
        .bind(item_id)
        .bind(quantity)
        .fetch_optional(&mut *self.tx)
        .await?;

        if let Some(row) = row {
            return Ok(Decrement::Applied(item_from_row(&row)?));
        }

        let available: Option<i64> = sqlx::query_scalar("SELECT quantity FROM items WHERE id = $1")
            .bind(item_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(match available {
            Some(available) => Decrement::Insufficient { available },
            None => Decrement::NotFound,
        })
    }
}

// =========================================================================
// OrderStore
// =========================================================================

#[async_trait]
impl OrderStore for PgUnitOfWork {
    async fn order_number_exists(&mut self, order_number: &str) -> Result<bool, StoreError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM orders WHERE order_number = $1)")
                .bind(order_number)
                .fetch_one(&mut *self.tx)
                .await?;
        Ok(exists)
    }

    async fn insert_order(&mut self, order: NewOrder) -> Result<Order, StoreError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO orders (
                order_number, payment_type, account_token, total, status,
                ledger_entry_id, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING id
            "#,
        )
        .bind(&order.order_number)
        .bind(order.payment_type.as_str())
        .bind(order.account_token.as_ref().map(|t| t.as_str().to_string()))
        .bind(order.total)
        .bind(OrderStatus::Preparing.as_str())
        .bind(order.ledger_entry_id)
        .bind(order.created_at)
        .fetch_one(&mut *self.tx)
        .await?;

        for (position, line) in order.lines.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_line_items (order_id, position, item_id, quantity, unit_price, label)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(id)
            .bind(position as i32)
            .bind(line.item_id)
            .bind(line.quantity)
            .bind(line.unit_price)
            .bind(&line.label)
            .execute(&mut *self.tx)
            .await?;
        }

        Ok(order.into_order(id))
    }

    async fn find_order(&mut self, order_number: &str) -> Result<Option<Order>, StoreError> {
        let query = format!(
            "SELECT {} FROM orders WHERE order_number = $1",
            ORDER_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(order_number)
            .fetch_optional(&mut *self.tx)
            .await?;

        self.load_order(row).await
    }

    async fn find_order_for_update(
        &mut self,
        order_number: &str,
    ) -> Result<Option<Order>, StoreError> {
        let query = format!(
            "SELECT {} FROM orders WHERE order_number = $1 FOR UPDATE",
            ORDER_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(order_number)
            .fetch_optional(&mut *self.tx)
            .await?;

        self.load_order(row).await
    }

    async fn set_order_status(
        &mut self,
        order_number: &str,
        status: OrderStatus,
    ) -> Result<Option<Order>, StoreError> {
        let query = format!(
            r#"
            UPDATE orders
            SET status = $2, updated_at = NOW()
            WHERE order_number = $1
            RETURNING {}
            "#,
            ORDER_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(order_number)
            .bind(status.as_str())
            .fetch_optional(&mut *self.tx)
            .await?;

        self.load_order(row).await
    }

    async fn list_orders(&mut self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError> {
        let query = format!(
            r#"
            SELECT {}
            FROM orders
            WHERE ($1::TEXT IS NULL OR status = $1)
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
            ORDER_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.limit)
            .fetch_all(&mut *self.tx)
            .await?;

        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids = rows
            .iter()
            .map(|row| row.try_get::<i64, _>("id"))
            .collect::<Result<Vec<_>, _>>()?;

        let line_rows = sqlx::query(
            r#"
            SELECT order_id, item_id, quantity, unit_price, label
            FROM order_line_items
            WHERE order_id = ANY($1)
            ORDER BY order_id, position
            "#,
        )
        .bind(&ids)
        .fetch_all(&mut *self.tx)
        .await?;

        let mut lines_by_order: HashMap<i64, Vec<OrderLineItem>> = HashMap::new();
        for row in &line_rows {
            let order_id: i64 = row.try_get("order_id")?;
            lines_by_order
                .entry(order_id)
                .or_default()
                .push(line_from_row(row)?);
        }

        rows.iter()
            .zip(ids)
            .map(|(row, id)| order_from_row(row, lines_by_order.remove(&id).unwrap_or_default()))
            .collect()
    }
}

// =========================================================================
// IdempotencyStore
// =========================================================================

#[async_trait]
impl IdempotencyStore for PgUnitOfWork {
    async fn find_idempotency_record(
        &mut self,
        key: Uuid,
    ) -> Result<Option<IdempotencyRecord>, StoreError> {
        let row: Option<(Uuid, String, String, serde_json::Value, DateTime<Utc>)> =
            sqlx::query_as(
                r#"
                SELECT key, scope, request_hash, response_body, created_at
                FROM idempotency_keys
                WHERE key = $1
                "#,
            )
            .bind(key)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(row.map(
            |(key, scope, request_hash, response_body, created_at)| IdempotencyRecord {
                key,
                scope,
                request_hash,
                response_body,
                created_at,
            },
        ))
    }

    async fn insert_idempotency_record(
        &mut self,
        record: &IdempotencyRecord,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO idempotency_keys (key, scope, request_hash, response_body, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(record.key)
        .bind(&record.scope)
        .bind(&record.request_hash)
        .bind(&record.response_body)
        .bind(record.created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn purge_idempotency_records(
        &mut self,
        older_than: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let rows = sqlx::query("DELETE FROM idempotency_keys WHERE created_at < $1")
            .bind(older_than)
            .execute(&mut *self.tx)
            .await?
            .rows_affected();

        Ok(rows)
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}
