//! Purchase processing.
//!
//! The [`Orchestrator`] composes the [`Wallet`] and the [`Catalog`] into a
//! purchase saga: check price and stock, debit the wallet, reserve a unit,
//! append the purchase record. A failure after the debit is compensated by
//! crediting the amount back, so an attempt either completes or leaves both
//! wallet and catalog as they were.
//!
//! No lock is held in process. Races between purchases are arbitrated by
//! the store's conditional increments alone.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::Amount;
use crate::model::{ItemId, PurchaseRecord, TransactionKind, UserId};
use crate::store::{LedgerStore, StoreError};

mod catalog;
pub use catalog::{ALL_CATEGORIES, Catalog};

mod error;
pub use error::{CatalogError, ConsistencyError, PurchaseError, WalletError};

mod retry;
pub use retry::RetryPolicy;
use retry::landed;

mod state;
pub use state::{PurchaseAttempt, PurchaseState};

mod wallet;
pub use wallet::{LoadSummary, Wallet};

/// What the buyer gets back from a successful purchase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Confirmation {
    pub purchase_id: Uuid,
    pub item_id: ItemId,
    pub item_name: String,
    pub price_paid: Amount,
    pub purchased_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PurchaseReceipt {
    pub new_balance: Amount,
    pub confirmation: Confirmation,
}

/// A recent sale joined with the buyer's name, for the leaderboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PurchaseSummary {
    pub username: String,
    pub item_name: String,
    pub price_paid: Amount,
    pub purchased_at: DateTime<Utc>,
}

/// The purchase orchestrator.
pub struct Orchestrator {
    store: Arc<dyn LedgerStore>,
    wallet: Wallet,
    catalog: Catalog,
    policy: RetryPolicy,
}

/// Public API
impl Orchestrator {
    pub fn new(store: Arc<dyn LedgerStore>, policy: RetryPolicy) -> Self {
        Self {
            wallet: Wallet::new(store.clone(), policy),
            catalog: Catalog::new(store.clone(), policy),
            store,
            policy,
        }
    }

    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Buy one unit of `item_id` for `user_id`.
    pub async fn purchase(
        &self,
        user_id: UserId,
        item_id: ItemId,
    ) -> Result<PurchaseReceipt, PurchaseError> {
        let mut attempt = PurchaseAttempt::new(user_id, item_id);
        let result = self.run_purchase(&mut attempt).await;
        Self::log_result(&attempt, &result);
        result
    }

    /// Most recent sales, newest first. Sales whose buyer no longer exists
    /// are left out.
    pub async fn latest_purchases(&self, limit: usize) -> Result<Vec<PurchaseSummary>, StoreError> {
        let records = self.policy.call(self.store.recent_purchases(limit)).await?;
        let mut summaries = Vec::with_capacity(records.len());
        for record in records {
            let Some(buyer) = self.policy.call(self.store.find_user(record.user_id)).await? else {
                continue;
            };
            summaries.push(PurchaseSummary {
                username: buyer.username,
                item_name: record.item_name,
                price_paid: record.price_paid,
                purchased_at: record.purchased_at,
            });
        }
        Ok(summaries)
    }
}

/// Private API
impl Orchestrator {
    fn log_result(attempt: &PurchaseAttempt, result: &Result<PurchaseReceipt, PurchaseError>) {
        match result {
            Ok(receipt) => {
                info!(
                    user = %attempt.user_id,
                    item = %attempt.item_id,
                    price = %receipt.confirmation.price_paid,
                    balance = %receipt.new_balance,
                    "purchase applied"
                );
            }
            // already reported with full context where it happened
            Err(PurchaseError::Consistency(_)) => {}
            Err(e) => {
                info!(
                    user = %attempt.user_id,
                    item = %attempt.item_id,
                    state = ?attempt.state(),
                    reason = %e,
                    "purchase rejected"
                );
            }
        }
    }

    /// Run the saga:
    /// - Load the item and the buyer's balance
    /// - Check stock, then check the balance covers the discounted price
    /// - Debit the wallet (conditional on the balance still covering it)
    /// - Reserve one unit (conditional on stock still being there), else refund
    /// - Append the purchase record, else return the unit and refund
    async fn run_purchase(
        &self,
        attempt: &mut PurchaseAttempt,
    ) -> Result<PurchaseReceipt, PurchaseError> {
        let (user_id, item_id) = (attempt.user_id, attempt.item_id);

        let item = self.catalog.get_item(item_id).await?;
        let balance = self.wallet.get_balance(user_id).await?;

        if !item.in_stock() {
            return Err(PurchaseError::OutOfStock(item_id));
        }
        let price = item.effective_price();
        if balance < price {
            return Err(PurchaseError::InsufficientCredit { balance, price });
        }
        attempt.advance(PurchaseState::PriceAndStockChecked);

        // free items have nothing to debit
        let new_balance = if price.is_positive() {
            match self.wallet.debit(user_id, price).await {
                Ok(balance) => balance,
                Err(WalletError::Store(StoreError::Timeout(after))) => {
                    return Err(Self::debit_unknown(attempt, price, after));
                }
                Err(e) => return Err(e.into()),
            }
        } else {
            balance
        };
        attempt.advance(PurchaseState::Debited);

        if let Err(e) = self.catalog.reserve_and_decrement(item_id).await {
            return Err(self.compensate(attempt, price, e.into(), false).await);
        }

        let record = PurchaseRecord::new(user_id, &item, price);
        let store = &*self.store;
        let appended = self
            .policy
            .retry_store("purchase record append", || {
                let record = record.clone();
                async move { landed(store.insert_purchase(record).await) }
            })
            .await;
        if let Err(e) = appended {
            return Err(self.compensate(attempt, price, e.into(), true).await);
        }
        attempt.advance(PurchaseState::Completed);

        Ok(PurchaseReceipt {
            new_balance,
            confirmation: Confirmation {
                purchase_id: record.id,
                item_id,
                item_name: record.item_name,
                price_paid: record.price_paid,
                purchased_at: record.purchased_at,
            },
        })
    }

    /// The debit increment timed out, so it may or may not have landed.
    /// Refunding could mint credit and skipping it could lose some, so the
    /// attempt is stranded with stock untouched.
    fn debit_unknown(attempt: &mut PurchaseAttempt, price: Amount, after: Duration) -> PurchaseError {
        let (user_id, item_id) = (attempt.user_id, attempt.item_id);
        attempt.advance(PurchaseState::Stranded);
        let reason = format!("debit outcome unknown after {after:?}");
        error!(
            user = %user_id,
            item = %item_id,
            amount = %price,
            reason = %reason,
            "purchase debit timed out, manual reconciliation required"
        );
        ConsistencyError {
            action: "purchase debit",
            user_id,
            item_id: Some(item_id),
            amount: price,
            reason,
        }
        .into()
    }

    /// Undo a debited attempt: return the reserved unit if there is one, then
    /// credit the price back. Both are retried; if either still fails the
    /// attempt is stranded and reported as a consistency failure.
    async fn compensate(
        &self,
        attempt: &mut PurchaseAttempt,
        price: Amount,
        cause: PurchaseError,
        reserved: bool,
    ) -> PurchaseError {
        let (user_id, item_id) = (attempt.user_id, attempt.item_id);
        let mut failures = Vec::new();

        if reserved {
            let catalog = &self.catalog;
            let restocked = self
                .policy
                .retry(
                    "purchase restock",
                    || catalog.restock(item_id),
                    CatalogError::is_transient,
                )
                .await;
            if let Err(e) = restocked {
                failures.push(format!("restock: {e}"));
            }
        }

        if price.is_positive() {
            let wallet = &self.wallet;
            let refunded = self
                .policy
                .retry(
                    "purchase refund",
                    || wallet.credit(user_id, price, TransactionKind::Refund),
                    WalletError::is_transient,
                )
                .await;
            if let Err(e) = refunded {
                failures.push(format!("refund: {e}"));
            }
        }

        if failures.is_empty() {
            attempt.advance(PurchaseState::CompensatedAndFailed);
            return cause;
        }

        attempt.advance(PurchaseState::Stranded);
        let reason = format!("{cause}; {}", failures.join("; "));
        error!(
            user = %user_id,
            item = %item_id,
            amount = %price,
            reason = %reason,
            "purchase compensation failed, manual reconciliation required"
        );
        ConsistencyError {
            action: "purchase compensation",
            user_id,
            item_id: Some(item_id),
            amount: price,
            reason,
        }
        .into()
    }
}
