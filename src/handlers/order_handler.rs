//! Order Fulfillment Service
//!
//! Creates orders as one unit: optional account debit, stock decrements for
//! every line, then the order header and lines. Any failure leaves no trace
//! of the order, the debit or earlier decrements.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;

use crate::directory::DirectoryPolicy;
use crate::domain::order::generate_order_number;
use crate::domain::{
    AccountToken, Amount, DomainError, Item, NewOrder, OperationContext, Order, OrderLineItem,
    OrderStatus, MAX_AMOUNT, MAX_SCALE,
};
use crate::error::{AppError, AppResult};
use crate::store::{Decrement, OrderFilter, Store, StoreError, UnitOfWork};

use super::account_handler::{idempotency_guard, require_actor};
use super::{
    AccountTransactionService, CreateOrderCommand, CreateOrderResult, DebitCommand,
    OrderLineRequest, UpdateOrderStatusCommand,
};

const ORDER_SCOPE: &str = "order";

/// Attempts at drawing an unused order number
const MAX_ORDER_NUMBER_ATTEMPTS: usize = 5;

/// Order listing limits
pub const DEFAULT_LIST_LIMIT: i64 = 50;
pub const MAX_LIST_LIMIT: i64 = 500;

// =========================================================================
// Validation
// =========================================================================

fn check_money(value: Decimal, field: &str) -> AppResult<()> {
    if value < Decimal::ZERO {
        return Err(DomainError::Validation(format!("{} must not be negative", field)).into());
    }
    if value.normalize().scale() > MAX_SCALE {
        return Err(DomainError::InvalidAmount(format!(
            "{} has more than {} decimal places",
            field, MAX_SCALE
        ))
        .into());
    }
    if value > MAX_AMOUNT {
        return Err(DomainError::InvalidAmount(format!(
            "{} exceeds maximum allowed value ({})",
            field, MAX_AMOUNT
        ))
        .into());
    }
    Ok(())
}

/// Validate an order request. Returns the amount to charge for
/// account-based payments.
fn validate(command: &CreateOrderCommand) -> AppResult<Option<(AccountToken, Amount)>> {
    if command.lines.is_empty() {
        return Err(DomainError::EmptyOrder.into());
    }

    for line in &command.lines {
        if line.quantity <= 0 {
            return Err(DomainError::Validation(format!(
                "quantity for item {} must be positive",
                line.item_id
            ))
            .into());
        }
        if let Some(price) = line.unit_price {
            check_money(price, "unitPrice")?;
        }
    }

    check_money(command.total, "total")?;
    require_actor(&command.actor)?;

    if !command.payment_type.is_account_based() {
        return Ok(None);
    }

    let token = command.token.clone().ok_or_else(|| {
        DomainError::Validation(format!(
            "token is required for {} payments",
            command.payment_type
        ))
    })?;
    let amount =
        Amount::new(command.total).map_err(|e| DomainError::InvalidAmount(e.to_string()))?;

    Ok(Some((token, amount)))
}

/// Total requested quantity per item, in ascending item id order
fn merged_quantities(lines: &[OrderLineRequest]) -> AppResult<BTreeMap<i64, i64>> {
    let mut merged: BTreeMap<i64, i64> = BTreeMap::new();
    for line in lines {
        let entry = merged.entry(line.item_id).or_insert(0);
        *entry = entry.checked_add(line.quantity).ok_or_else(|| {
            DomainError::Validation(format!("quantity for item {} is too large", line.item_id))
        })?;
    }
    Ok(merged)
}

fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
}

// =========================================================================
// OrderFulfillmentService
// =========================================================================

/// Service for creating and tracking orders
#[derive(Clone)]
pub struct OrderFulfillmentService {
    store: Arc<dyn Store>,
    accounts: DirectoryPolicy,
    strict_transitions: bool,
}

impl OrderFulfillmentService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            accounts: DirectoryPolicy::disabled(),
            strict_transitions: false,
        }
    }

    pub fn with_directory(mut self, accounts: DirectoryPolicy) -> Self {
        self.accounts = accounts;
        self
    }

    /// Only allow `Preparing -> Serving -> Completed` and cancellation
    /// before completion
    pub fn with_strict_transitions(mut self, strict: bool) -> Self {
        self.strict_transitions = strict;
        self
    }

    /// Create an order, charging the account for `card` payments and
    /// decrementing stock for every line.
    pub async fn create_order(
        &self,
        command: CreateOrderCommand,
        context: &OperationContext,
    ) -> AppResult<CreateOrderResult> {
        let charge = validate(&command)?;
        let quantities = merged_quantities(&command.lines)?;
        if let Some((token, _)) = &charge {
            self.accounts.profile(token).await?;
        }
        let guard = idempotency_guard(context, ORDER_SCOPE, &command)?;

        let mut uow = self.store.begin().await?;

        if let Some(guard) = &guard {
            if let Some(cached) = guard.replay::<CreateOrderResult>(uow.as_mut()).await? {
                return Ok(cached);
            }
        }

        let now = Utc::now();
        let order_number = Self::allocate_order_number(uow.as_mut(), now).await?;

        let ledger_entry_id = match &charge {
            Some((token, amount)) => {
                let debit = DebitCommand::new(token.clone(), *amount, command.actor.clone())
                    .with_label(format!("Order {}", order_number));
                let debited = AccountTransactionService::debit_within(uow.as_mut(), &debit).await?;
                Some(debited.transaction_id)
            }
            None => None,
        };

        let catalog = Self::decrement_stock(uow.as_mut(), &quantities).await?;

        let lines = command
            .lines
            .iter()
            .map(|line| {
                let item = catalog
                    .get(&line.item_id)
                    .ok_or(DomainError::ItemNotFound(line.item_id))?;
                Ok(OrderLineItem {
                    item_id: line.item_id,
                    quantity: line.quantity,
                    unit_price: line.unit_price.unwrap_or(item.price),
                    label: line
                        .label
                        .clone()
                        .filter(|label| !label.trim().is_empty())
                        .unwrap_or_else(|| item.name.clone()),
                })
            })
            .collect::<Result<Vec<_>, DomainError>>()?;

        let line_sum = lines
            .iter()
            .try_fold(Decimal::ZERO, |sum, line| {
                line.line_total().and_then(|total| sum.checked_add(total))
            })
            .ok_or_else(|| DomainError::Validation("order lines total is too large".to_string()))?;
        if line_sum != command.total {
            tracing::warn!(
                order_number = %order_number,
                total = %command.total,
                line_sum = %line_sum,
                "Order total differs from the sum of its lines"
            );
        }

        let order = uow
            .insert_order(NewOrder {
                order_number: order_number.clone(),
                payment_type: command.payment_type,
                account_token: command.token.clone(),
                total: command.total,
                ledger_entry_id,
                lines,
                created_at: now,
            })
            .await?;

        let result = CreateOrderResult {
            order_number,
            order,
        };

        if let Some(guard) = &guard {
            guard.remember(uow.as_mut(), &result).await?;
        }
        uow.commit().await?;

        tracing::info!(
            correlation_id = ?context.correlation_id,
            order_number = %result.order_number,
            payment_type = %result.order.payment_type,
            total = %result.order.total,
            line_count = result.order.lines.len(),
            ledger_entry_id = ?result.order.ledger_entry_id,
            "Order created"
        );

        Ok(result)
    }

    async fn allocate_order_number(
        uow: &mut dyn UnitOfWork,
        now: chrono::DateTime<Utc>,
    ) -> AppResult<String> {
        for attempt in 1..=MAX_ORDER_NUMBER_ATTEMPTS {
            let candidate = generate_order_number(now);
            if !uow.order_number_exists(&candidate).await? {
                return Ok(candidate);
            }
            tracing::warn!(
                attempt,
                order_number = %candidate,
                "Order number collision, regenerating"
            );
        }

        Err(StoreError::Conflict(format!(
            "no unused order number after {} attempts",
            MAX_ORDER_NUMBER_ATTEMPTS
        ))
        .into())
    }

    /// Decrement in ascending item id order; stops at the first shortfall.
    async fn decrement_stock(
        uow: &mut dyn UnitOfWork,
        quantities: &BTreeMap<i64, i64>,
    ) -> AppResult<HashMap<i64, Item>> {
        let mut catalog = HashMap::with_capacity(quantities.len());

        for (&item_id, &requested) in quantities {
            match uow.decrement(item_id, requested).await? {
                Decrement::Applied(item) => {
                    tracing::debug!(
                        item_id,
                        requested,
                        remaining = item.quantity,
                        "Stock decremented"
                    );
                    catalog.insert(item_id, item);
                }
                Decrement::Insufficient { available } => {
                    tracing::warn!(item_id, requested, available, "Order rejected: insufficient stock");
                    return Err(DomainError::insufficient_stock(item_id, available, requested).into());
                }
                Decrement::NotFound => {
                    return Err(DomainError::ItemNotFound(item_id).into());
                }
            }
        }

        Ok(catalog)
    }

    /// Move an order to `status`
    pub async fn update_status(
        &self,
        command: UpdateOrderStatusCommand,
        context: &OperationContext,
    ) -> AppResult<Order> {
        let mut uow = self.store.begin().await?;

        let current = uow
            .find_order_for_update(&command.order_number)
            .await?
            .ok_or_else(|| DomainError::OrderNotFound(command.order_number.clone()))?;

        if self.strict_transitions && !current.status.can_transition_to(command.status) {
            return Err(DomainError::InvalidTransition {
                from: current.status,
                to: command.status,
            }
            .into());
        }

        let updated = uow
            .set_order_status(&command.order_number, command.status)
            .await?
            .ok_or_else(|| DomainError::OrderNotFound(command.order_number.clone()))?;
        uow.commit().await?;

        tracing::info!(
            correlation_id = ?context.correlation_id,
            order_number = %updated.order_number,
            from = %current.status,
            to = %updated.status,
            "Order status updated"
        );

        Ok(updated)
    }

    pub async fn get_order(&self, order_number: &str) -> AppResult<Order> {
        let mut uow = self.store.begin().await?;
        uow.find_order(order_number)
            .await?
            .ok_or_else(|| AppError::from(DomainError::OrderNotFound(order_number.to_string())))
    }

    /// Orders newest first, optionally filtered by status
    pub async fn list_orders(
        &self,
        limit: Option<i64>,
        status: Option<OrderStatus>,
    ) -> AppResult<Vec<Order>> {
        let filter = OrderFilter {
            limit: clamp_limit(limit),
            status,
        };
        let mut uow = self.store.begin().await?;
        Ok(uow.list_orders(&filter).await?)
    }
}
