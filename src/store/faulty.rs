//! Store double that injects races and outages on top of [`MemoryStore`].

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::{Increment, LedgerStore, MemoryStore, StoreError, StoreResult, UpdateOutcome};
use crate::Amount;
use crate::model::{
    CreditTransaction, ItemId, MarketItem, PurchaseRecord, TransactionKind, User, UserId,
};

#[derive(Debug, Default)]
pub(crate) struct FaultyStore {
    pub inner: MemoryStore,
    /// After the next item read, empty the item's stock as a racing buyer would.
    pub steal_stock_after_read: AtomicBool,
    /// After the next user read, drain the balance as a racing purchase would.
    pub drain_credit_after_read: AtomicBool,
    /// Number of positive credit increments to fail before succeeding.
    pub failing_refunds: AtomicUsize,
    pub failing_restocks: AtomicUsize,
    pub failing_purchase_inserts: AtomicUsize,
    pub failing_ledger_inserts: AtomicUsize,
    /// Hold the next credit decrement this long before applying it.
    pub stall_next_debit: Mutex<Option<Duration>>,
}

fn take_failure(counter: &AtomicUsize) -> StoreResult<()> {
    let remaining = counter.load(Ordering::SeqCst);
    if remaining == 0 {
        return Ok(());
    }
    counter.store(remaining - 1, Ordering::SeqCst);
    Err(StoreError::Unavailable("injected outage".to_string()))
}

#[async_trait]
impl LedgerStore for FaultyStore {
    async fn find_user(&self, id: UserId) -> StoreResult<Option<User>> {
        let user = self.inner.find_user(id).await?;
        if let Some(found) = &user {
            if self.drain_credit_after_read.swap(false, Ordering::SeqCst) {
                self.inner
                    .increment_credit(id, Increment::unconditional(-found.credit_balance))
                    .await?;
            }
        }
        Ok(user)
    }

    async fn insert_user(&self, user: User) -> StoreResult<()> {
        self.inner.insert_user(user).await
    }

    async fn richest_users(&self, limit: usize) -> StoreResult<Vec<User>> {
        self.inner.richest_users(limit).await
    }

    async fn increment_credit(
        &self,
        id: UserId,
        update: Increment<Amount>,
    ) -> StoreResult<UpdateOutcome<Amount>> {
        if update.by.is_positive() {
            take_failure(&self.failing_refunds)?;
        }
        let stall = if update.by.is_negative() {
            self.stall_next_debit.lock().unwrap().take()
        } else {
            None
        };
        if let Some(stall) = stall {
            tokio::time::sleep(stall).await;
        }
        self.inner.increment_credit(id, update).await
    }

    async fn find_item(&self, id: ItemId) -> StoreResult<Option<MarketItem>> {
        let item = self.inner.find_item(id).await?;
        if let Some(found) = &item {
            if self.steal_stock_after_read.swap(false, Ordering::SeqCst) {
                self.inner
                    .increment_stock(id, Increment::unconditional(-i64::from(found.stock)))
                    .await?;
            }
        }
        Ok(item)
    }

    async fn list_items(&self, category: Option<&str>) -> StoreResult<Vec<MarketItem>> {
        self.inner.list_items(category).await
    }

    async fn insert_item(&self, item: MarketItem) -> StoreResult<()> {
        self.inner.insert_item(item).await
    }

    async fn increment_stock(
        &self,
        id: ItemId,
        update: Increment<i64>,
    ) -> StoreResult<UpdateOutcome<u32>> {
        if update.by > 0 {
            take_failure(&self.failing_restocks)?;
        }
        self.inner.increment_stock(id, update).await
    }

    async fn insert_purchase(&self, record: PurchaseRecord) -> StoreResult<()> {
        take_failure(&self.failing_purchase_inserts)?;
        self.inner.insert_purchase(record).await
    }

    async fn recent_purchases(&self, limit: usize) -> StoreResult<Vec<PurchaseRecord>> {
        self.inner.recent_purchases(limit).await
    }

    async fn best_selling(&self, limit: usize) -> StoreResult<Vec<(ItemId, u64)>> {
        self.inner.best_selling(limit).await
    }

    async fn insert_credit_transaction(&self, transaction: CreditTransaction) -> StoreResult<()> {
        take_failure(&self.failing_ledger_inserts)?;
        self.inner.insert_credit_transaction(transaction).await
    }

    async fn credit_transactions(
        &self,
        user: UserId,
        limit: usize,
    ) -> StoreResult<Vec<CreditTransaction>> {
        self.inner.credit_transactions(user, limit).await
    }

    async fn recent_credit_transactions(
        &self,
        kind: TransactionKind,
        limit: usize,
    ) -> StoreResult<Vec<CreditTransaction>> {
        self.inner.recent_credit_transactions(kind, limit).await
    }
}
