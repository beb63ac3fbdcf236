use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use super::error::{ConsistencyError, WalletError};
use super::retry::{RetryPolicy, landed};
use crate::Amount;
use crate::model::{CreditTransaction, TransactionKind, TransactionStatus, User, UserId};
use crate::store::{Increment, LedgerStore, UpdateOutcome};

/// A recent top-up joined with the user's name, for the leaderboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadSummary {
    pub username: String,
    pub amount: Amount,
    pub status: TransactionStatus,
    pub timestamp: DateTime<Utc>,
}

/// Credit balance arithmetic for users.
///
/// Holds no state of its own: every call re-reads the user from the store,
/// and every balance change is a single conditional increment followed by a
/// ledger entry.
#[derive(Clone)]
pub struct Wallet {
    store: Arc<dyn LedgerStore>,
    policy: RetryPolicy,
}

impl Wallet {
    pub fn new(store: Arc<dyn LedgerStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    pub async fn get_user(&self, user: UserId) -> Result<User, WalletError> {
        self.policy
            .call(self.store.find_user(user))
            .await?
            .ok_or(WalletError::UserNotFound(user))
    }

    pub async fn get_balance(&self, user: UserId) -> Result<Amount, WalletError> {
        Ok(self.get_user(user).await?.credit_balance)
    }

    /// Take `amount` from the balance if it covers it, and record a
    /// `purchase-debit` entry. Returns the new balance.
    pub async fn debit(&self, user: UserId, amount: Amount) -> Result<Amount, WalletError> {
        if !amount.is_positive() {
            return Err(WalletError::InvalidAmount(amount));
        }

        let outcome = self
            .policy
            .call(
                self.store
                    .increment_credit(user, Increment::guarded(-amount, amount)),
            )
            .await?;

        let balance = match outcome {
            UpdateOutcome::Applied(balance) => balance,
            UpdateOutcome::PreconditionFailed(current) => {
                return Err(WalletError::InsufficientCredit(user, current, amount));
            }
            UpdateOutcome::NotFound => return Err(WalletError::UserNotFound(user)),
        };

        self.record(user, -amount, TransactionKind::PurchaseDebit)
            .await?;
        info!(user = %user, amount = %amount, balance = %balance, "wallet debited");
        Ok(balance)
    }

    /// Add `amount` to the balance and record an entry of the given kind.
    /// Returns the new balance.
    pub async fn credit(
        &self,
        user: UserId,
        amount: Amount,
        kind: TransactionKind,
    ) -> Result<Amount, WalletError> {
        if !amount.is_positive() {
            return Err(WalletError::InvalidAmount(amount));
        }

        let outcome = self
            .policy
            .call(
                self.store
                    .increment_credit(user, Increment::unconditional(amount)),
            )
            .await?;

        let balance = match outcome {
            UpdateOutcome::Applied(balance) => balance,
            // only reachable on overflow
            UpdateOutcome::PreconditionFailed(_) => return Err(WalletError::InvalidAmount(amount)),
            UpdateOutcome::NotFound => return Err(WalletError::UserNotFound(user)),
        };

        self.record(user, amount, kind).await?;
        info!(user = %user, amount = %amount, kind = ?kind, balance = %balance, "wallet credited");
        Ok(balance)
    }

    /// Open a pending top-up. The balance only changes once the payment
    /// provider settles it.
    pub async fn request_load(
        &self,
        user: UserId,
        amount: Amount,
    ) -> Result<CreditTransaction, WalletError> {
        if !amount.is_positive() {
            return Err(WalletError::InvalidAmount(amount));
        }
        self.get_balance(user).await?;

        let entry = CreditTransaction::pending(user, amount, TransactionKind::Load);
        let store = &*self.store;
        self.policy
            .retry_store("pending load append", || {
                let entry = entry.clone();
                async move { landed(store.insert_credit_transaction(entry).await) }
            })
            .await?;

        info!(user = %user, amount = %amount, transaction = %entry.id, "load requested");
        Ok(entry)
    }

    /// Ledger entries of `user`, newest first.
    pub async fn history(
        &self,
        user: UserId,
        limit: usize,
    ) -> Result<Vec<CreditTransaction>, WalletError> {
        Ok(self
            .policy
            .call(self.store.credit_transactions(user, limit))
            .await?)
    }

    /// Users holding the most credit first.
    pub async fn richest(&self, limit: usize) -> Result<Vec<User>, WalletError> {
        Ok(self.policy.call(self.store.richest_users(limit)).await?)
    }

    /// Most recent top-ups of any status, newest first. Entries whose user no
    /// longer exists are left out.
    pub async fn latest_loads(&self, limit: usize) -> Result<Vec<LoadSummary>, WalletError> {
        let loads = self
            .policy
            .call(self.store.recent_credit_transactions(TransactionKind::Load, limit))
            .await?;
        let mut summaries = Vec::with_capacity(loads.len());
        for load in loads {
            let Some(user) = self.policy.call(self.store.find_user(load.user_id)).await? else {
                continue;
            };
            summaries.push(LoadSummary {
                username: user.username,
                amount: load.amount,
                status: load.status,
                timestamp: load.created_at,
            });
        }
        Ok(summaries)
    }

    /// Append the ledger entry for a balance change that already happened.
    /// If the append cannot be persisted the change is reverted, so balance
    /// and ledger never disagree.
    async fn record(
        &self,
        user: UserId,
        signed_amount: Amount,
        kind: TransactionKind,
    ) -> Result<(), WalletError> {
        let entry = CreditTransaction::completed(user, signed_amount, kind);
        let store = &*self.store;
        let appended = self
            .policy
            .retry_store("credit ledger append", || {
                let entry = entry.clone();
                async move { landed(store.insert_credit_transaction(entry).await) }
            })
            .await;

        let Err(source) = appended else {
            return Ok(());
        };

        // a revert that takes credit back must not push the balance below zero
        let revert = if signed_amount.is_negative() {
            Increment::unconditional(-signed_amount)
        } else {
            Increment::guarded(-signed_amount, signed_amount)
        };
        let reverted = self
            .policy
            .retry_store("credit ledger revert", || store.increment_credit(user, revert))
            .await;

        match reverted {
            Ok(UpdateOutcome::Applied(_)) => {
                warn!(user = %user, amount = %signed_amount, error = %source, "ledger append failed, balance change reverted");
                Err(WalletError::Store(source))
            }
            other => {
                let reason = match other {
                    Err(e) => e.to_string(),
                    Ok(outcome) => format!("revert refused: {outcome:?}"),
                };
                error!(
                    user = %user,
                    amount = %signed_amount,
                    kind = ?kind,
                    append_error = %source,
                    revert_error = %reason,
                    "balance changed without ledger entry, manual reconciliation required"
                );
                Err(ConsistencyError {
                    action: "credit ledger append",
                    user_id: user,
                    item_id: None,
                    amount: signed_amount,
                    reason,
                }
                .into())
            }
        }
    }
}
