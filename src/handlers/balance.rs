//! Balance Calculator
//!
//! Read side of the ledger. Balances are always derived from the entries,
//! never cached between calls.

use std::sync::Arc;

use crate::directory::DirectoryPolicy;
use crate::domain::{fold_balance, AccountToken, Balance};
use crate::error::AppResult;
use crate::store::{Store, StoreError, UnitOfWork};

use super::{AccountBalance, AccountHistory, BalanceView};

/// Computes account balances from the ledger
#[derive(Clone)]
pub struct BalanceCalculator {
    store: Arc<dyn Store>,
    accounts: DirectoryPolicy,
}

impl BalanceCalculator {
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

    /// Balance as seen by an open unit of work
    pub async fn balance_within(
        uow: &mut dyn UnitOfWork,
        token: &AccountToken,
    ) -> Result<Balance, StoreError> {
        Ok(uow.totals_for(token).await?.balance())
    }

    /// `sum(credit) - sum(debit)` over the committed entries of `token`.
    /// Unknown tokens have a zero balance.
    pub async fn balance_of(&self, token: &AccountToken) -> AppResult<Balance> {
        let mut uow = self.store.begin().await?;
        let balance = Self::balance_within(uow.as_mut(), token).await?;
        Ok(balance)
    }

    /// Balance enriched with the directory profile, if any
    pub async fn balance_view(&self, token: &AccountToken) -> AppResult<BalanceView> {
        let profile = self.accounts.profile(token).await?;
        let balance = self.balance_of(token).await?;

        tracing::debug!(token = %token, balance = %balance, "Balance read");

        Ok(BalanceView {
            token: token.clone(),
            balance: balance.value(),
            profile,
        })
    }

    /// Every entry of `token` in chronological order, with the balance they
    /// fold to.
    pub async fn history(&self, token: &AccountToken) -> AppResult<AccountHistory> {
        self.accounts.profile(token).await?;

        let mut uow = self.store.begin().await?;
        let entries = uow.entries_for(token).await?;
        let balance = fold_balance(&entries);

        Ok(AccountHistory {
            token: token.clone(),
            balance: balance.value(),
            entries,
        })
    }

    /// Balances of every account present in the ledger, in numeric token order
    pub async fn balances(&self) -> AppResult<Vec<AccountBalance>> {
        let mut uow = self.store.begin().await?;
        let totals = uow.account_totals().await?;

        Ok(totals
            .into_iter()
            .map(|account| AccountBalance {
                balance: account.totals.balance().value(),
                total_credit: account.totals.credit,
                total_debit: account.totals.debit,
                entry_count: account.totals.entry_count,
                token: account.account_token,
            })
            .collect())
    }
}
