//! Account Transaction Service
//!
//! Credits and debits against prepaid accounts. Every operation runs in one
//! unit of work under the account lock, so the balance check and the entry
//! it guards are never separated by a concurrent write.

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::directory::DirectoryPolicy;
use crate::domain::{
    Actor, DomainError, EntryKind, NewLedgerEntry, OperationContext, MAX_AMOUNT, MAX_SCALE,
};
use crate::error::{AppError, AppResult};
use crate::idempotency::IdempotencyGuard;
use crate::store::{Store, UnitOfWork};

use super::{BalanceCalculator, CreditCommand, DebitCommand, TransactionResult};

const CREDIT_SCOPE: &str = "credit";
const PAYMENT_SCOPE: &str = "payment";

pub(crate) fn require_actor(actor: &Actor) -> AppResult<()> {
    if actor.is_complete() {
        Ok(())
    } else {
        Err(DomainError::Validation("employeeId and username are required".to_string()).into())
    }
}

/// Ledger quantities share the money column shape: positive, cents, capped
fn check_quantity(quantity: Decimal) -> AppResult<()> {
    if quantity <= Decimal::ZERO {
        return Err(DomainError::Validation("quantity must be positive".to_string()).into());
    }
    if quantity.normalize().scale() > MAX_SCALE {
        return Err(DomainError::Validation(format!(
            "quantity has more than {} decimal places",
            MAX_SCALE
        ))
        .into());
    }
    if quantity > MAX_AMOUNT {
        return Err(DomainError::Validation(format!(
            "quantity exceeds maximum allowed value ({})",
            MAX_AMOUNT
        ))
        .into());
    }
    Ok(())
}

pub(crate) fn idempotency_guard<T: serde::Serialize>(
    context: &OperationContext,
    scope: &'static str,
    request: &T,
) -> AppResult<Option<IdempotencyGuard>> {
    context
        .idempotency_key
        .map(|key| IdempotencyGuard::new(key, scope, request))
        .transpose()
        .map_err(|e| AppError::Internal(format!("Failed to fingerprint request: {}", e)))
}

// =========================================================================
// AccountTransactionService
// =========================================================================

/// Service for account credits and debits
#[derive(Clone)]
pub struct AccountTransactionService {
    store: Arc<dyn Store>,
    accounts: DirectoryPolicy,
}

impl AccountTransactionService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            accounts: DirectoryPolicy::disabled(),
        }
    }

    pub fn with_directory(mut self, accounts: DirectoryPolicy) -> Self {
        self.accounts = accounts;
        self
    }

    /// Top up an account. The returned balance includes the new entry.
    pub async fn credit(
        &self,
        command: CreditCommand,
        context: &OperationContext,
    ) -> AppResult<TransactionResult> {
        require_actor(&command.actor)?;
        self.accounts.profile(&command.token).await?;
        let guard = idempotency_guard(context, CREDIT_SCOPE, &command)?;

        let mut uow = self.store.begin().await?;
        uow.lock_account(&command.token).await?;

        if let Some(guard) = &guard {
            if let Some(cached) = guard.replay::<TransactionResult>(uow.as_mut()).await? {
                return Ok(cached);
            }
        }

        let entry = uow
            .append(NewLedgerEntry::new(
                command.token.clone(),
                EntryKind::Credit,
                command.amount,
                &command.actor,
            ))
            .await?;
        let balance = BalanceCalculator::balance_within(uow.as_mut(), &command.token).await?;

        let result = TransactionResult {
            token: command.token,
            new_balance: balance.value(),
            transaction_id: entry.id,
            reference_code: entry.reference_code,
        };

        if let Some(guard) = &guard {
            guard.remember(uow.as_mut(), &result).await?;
        }
        uow.commit().await?;

        tracing::info!(
            correlation_id = ?context.correlation_id,
            token = %result.token,
            amount = %command.amount,
            entry_id = result.transaction_id,
            new_balance = %result.new_balance,
            "Account credited"
        );

        Ok(result)
    }

    /// Charge an account. Fails with `InsufficientFunds` and writes nothing
    /// when the balance does not cover the amount.
    pub async fn debit(
        &self,
        command: DebitCommand,
        context: &OperationContext,
    ) -> AppResult<TransactionResult> {
        require_actor(&command.actor)?;
        self.accounts.profile(&command.token).await?;
        let guard = idempotency_guard(context, PAYMENT_SCOPE, &command)?;

        let mut uow = self.store.begin().await?;
        uow.lock_account(&command.token).await?;

        if let Some(guard) = &guard {
            if let Some(cached) = guard.replay::<TransactionResult>(uow.as_mut()).await? {
                return Ok(cached);
            }
        }

        let result = Self::debit_within(uow.as_mut(), &command).await?;

        if let Some(guard) = &guard {
            guard.remember(uow.as_mut(), &result).await?;
        }
        uow.commit().await?;

        tracing::info!(
            correlation_id = ?context.correlation_id,
            token = %result.token,
            amount = %command.amount,
            entry_id = result.transaction_id,
            new_balance = %result.new_balance,
            "Account debited"
        );

        Ok(result)
    }

    /// Check-and-append for a debit inside a caller's unit of work. Takes the
    /// account lock; the caller commits.
    pub async fn debit_within(
        uow: &mut dyn UnitOfWork,
        command: &DebitCommand,
    ) -> AppResult<TransactionResult> {
        if let Some(quantity) = command.quantity {
            check_quantity(quantity)?;
        }

        uow.lock_account(&command.token).await?;
        let balance = BalanceCalculator::balance_within(uow, &command.token).await?;

        if !balance.is_sufficient_for(&command.amount) {
            tracing::warn!(
                token = %command.token,
                balance = %balance,
                amount = %command.amount,
                "Debit rejected: insufficient funds"
            );
            return Err(
                DomainError::insufficient_funds(balance.value(), command.amount.value()).into(),
            );
        }

        let mut entry = NewLedgerEntry::new(
            command.token.clone(),
            EntryKind::Debit,
            command.amount,
            &command.actor,
        );
        if let Some(label) = &command.label {
            entry = entry.with_label(label.clone());
        }
        if let Some(quantity) = command.quantity {
            entry = entry.with_quantity(quantity);
        }

        let entry = uow.append(entry).await?;

        Ok(TransactionResult {
            token: command.token.clone(),
            new_balance: balance.debit(&command.amount).value(),
            transaction_id: entry.id,
            reference_code: entry.reference_code,
        })
    }
}
