//! Persistence collaborator consumed by the wallet, catalog and orchestrator.
//!
//! Every mutation of a counter goes through a single-document conditional
//! increment: the store checks the precondition and applies the delta under
//! one lock, so callers never do read-then-write.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::Amount;
use crate::model::{
    CreditTransaction, ItemId, MarketItem, PurchaseRecord, TransactionKind, User, UserId,
};

mod memory;
pub use memory::MemoryStore;

#[cfg(test)]
pub(crate) mod faulty;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("document {0} already exists")]
    Duplicate(Uuid),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Increment of a numeric field, applied only while the field is at least
/// `require_at_least`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Increment<T> {
    pub by: T,
    pub require_at_least: Option<T>,
}

impl<T> Increment<T> {
    pub fn unconditional(by: T) -> Self {
        Self {
            by,
            require_at_least: None,
        }
    }

    pub fn guarded(by: T, require_at_least: T) -> Self {
        Self {
            by,
            require_at_least: Some(require_at_least),
        }
    }
}

/// Result of a conditional increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome<T> {
    /// Applied; carries the new value.
    Applied(T),
    /// Precondition did not hold; carries the value that was observed.
    PreconditionFailed(T),
    NotFound,
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn find_user(&self, id: UserId) -> StoreResult<Option<User>>;

    async fn insert_user(&self, user: User) -> StoreResult<()>;

    /// Users with the largest credit balance first.
    async fn richest_users(&self, limit: usize) -> StoreResult<Vec<User>>;

    async fn increment_credit(
        &self,
        id: UserId,
        update: Increment<Amount>,
    ) -> StoreResult<UpdateOutcome<Amount>>;

    async fn find_item(&self, id: ItemId) -> StoreResult<Option<MarketItem>>;

    /// Items of one category, or all items when `category` is `None`.
    async fn list_items(&self, category: Option<&str>) -> StoreResult<Vec<MarketItem>>;

    async fn insert_item(&self, item: MarketItem) -> StoreResult<()>;

    async fn increment_stock(
        &self,
        id: ItemId,
        update: Increment<i64>,
    ) -> StoreResult<UpdateOutcome<u32>>;

    async fn insert_purchase(&self, record: PurchaseRecord) -> StoreResult<()>;

    /// Newest first.
    async fn recent_purchases(&self, limit: usize) -> StoreResult<Vec<PurchaseRecord>>;

    /// Item ids with their sale counts, most sold first.
    async fn best_selling(&self, limit: usize) -> StoreResult<Vec<(ItemId, u64)>>;

    async fn insert_credit_transaction(&self, transaction: CreditTransaction) -> StoreResult<()>;

    /// Ledger entries of one user, newest first.
    async fn credit_transactions(
        &self,
        user: UserId,
        limit: usize,
    ) -> StoreResult<Vec<CreditTransaction>>;

    /// Ledger entries of one kind across all users, newest first.
    async fn recent_credit_transactions(
        &self,
        kind: TransactionKind,
        limit: usize,
    ) -> StoreResult<Vec<CreditTransaction>>;
}
