use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Increment, LedgerStore, StoreError, StoreResult, UpdateOutcome};
use crate::Amount;
use crate::model::{
    CreditTransaction, ItemId, MarketItem, PurchaseRecord, TransactionKind, User, UserId,
};

/// In-process document store.
///
/// Users and items live in sharded maps; holding an entry guard is the
/// single-document lock that makes conditional increments atomic. The two
/// ledgers are append-only vectors.
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: DashMap<UserId, User>,
    items: DashMap<ItemId, MarketItem>,
    purchases: RwLock<AppendLog<PurchaseRecord>>,
    credit_transactions: RwLock<AppendLog<CreditTransaction>>,
}

/// Append-only entries, indexed by id to refuse duplicates.
#[derive(Debug)]
struct AppendLog<T> {
    entries: Vec<T>,
    ids: HashSet<Uuid>,
}

impl<T> Default for AppendLog<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            ids: HashSet::new(),
        }
    }
}

impl<T> AppendLog<T> {
    fn append(&mut self, id: Uuid, entry: T) -> StoreResult<()> {
        if !self.ids.insert(id) {
            return Err(StoreError::Duplicate(id));
        }
        self.entries.push(entry);
        Ok(())
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn find_user(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.users.get(&id).map(|user| user.value().clone()))
    }

    async fn insert_user(&self, user: User) -> StoreResult<()> {
        match self.users.entry(user.id) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(user.id)),
            Entry::Vacant(slot) => {
                slot.insert(user);
                Ok(())
            }
        }
    }

    async fn richest_users(&self, limit: usize) -> StoreResult<Vec<User>> {
        let mut users: Vec<User> = self.users.iter().map(|user| user.value().clone()).collect();
        users.sort_by(|a, b| {
            b.credit_balance
                .cmp(&a.credit_balance)
                .then_with(|| a.username.cmp(&b.username))
        });
        users.truncate(limit);
        Ok(users)
    }

    async fn increment_credit(
        &self,
        id: UserId,
        update: Increment<Amount>,
    ) -> StoreResult<UpdateOutcome<Amount>> {
        let Some(mut user) = self.users.get_mut(&id) else {
            return Ok(UpdateOutcome::NotFound);
        };

        let current = user.credit_balance;
        if let Some(min) = update.require_at_least {
            if current < min {
                return Ok(UpdateOutcome::PreconditionFailed(current));
            }
        }

        let Some(next) = current.checked_add(update.by) else {
            return Ok(UpdateOutcome::PreconditionFailed(current));
        };
        user.credit_balance = next;
        Ok(UpdateOutcome::Applied(next))
    }

    async fn find_item(&self, id: ItemId) -> StoreResult<Option<MarketItem>> {
        Ok(self.items.get(&id).map(|item| item.value().clone()))
    }

    async fn list_items(&self, category: Option<&str>) -> StoreResult<Vec<MarketItem>> {
        let mut items: Vec<MarketItem> = self
            .items
            .iter()
            .filter(|item| category.is_none_or(|c| item.category == c))
            .map(|item| item.value().clone())
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(items)
    }

    async fn insert_item(&self, item: MarketItem) -> StoreResult<()> {
        match self.items.entry(item.id) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(item.id)),
            Entry::Vacant(slot) => {
                slot.insert(item);
                Ok(())
            }
        }
    }

    async fn increment_stock(
        &self,
        id: ItemId,
        update: Increment<i64>,
    ) -> StoreResult<UpdateOutcome<u32>> {
        let Some(mut item) = self.items.get_mut(&id) else {
            return Ok(UpdateOutcome::NotFound);
        };

        let current = item.stock;
        if let Some(min) = update.require_at_least {
            if i64::from(current) < min {
                return Ok(UpdateOutcome::PreconditionFailed(current));
            }
        }

        // stock is unsigned, so a delta that would leave it negative is refused
        let Ok(next) = u32::try_from(i64::from(current) + update.by) else {
            return Ok(UpdateOutcome::PreconditionFailed(current));
        };
        item.stock = next;
        Ok(UpdateOutcome::Applied(next))
    }

    async fn insert_purchase(&self, record: PurchaseRecord) -> StoreResult<()> {
        self.purchases.write().await.append(record.id, record)
    }

    async fn recent_purchases(&self, limit: usize) -> StoreResult<Vec<PurchaseRecord>> {
        // reversed first so equal timestamps still come out newest first
        let mut purchases: Vec<PurchaseRecord> =
            self.purchases.read().await.entries.iter().rev().cloned().collect();
        purchases.sort_by(|a, b| b.purchased_at.cmp(&a.purchased_at));
        purchases.truncate(limit);
        Ok(purchases)
    }

    async fn best_selling(&self, limit: usize) -> StoreResult<Vec<(ItemId, u64)>> {
        let mut counts: HashMap<ItemId, u64> = HashMap::new();
        for record in self.purchases.read().await.entries.iter() {
            *counts.entry(record.item_id).or_default() += 1;
        }

        let mut ranked: Vec<(ItemId, u64)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(limit);
        Ok(ranked)
    }

    async fn insert_credit_transaction(&self, transaction: CreditTransaction) -> StoreResult<()> {
        self.credit_transactions
            .write()
            .await
            .append(transaction.id, transaction)
    }

    async fn credit_transactions(
        &self,
        user: UserId,
        limit: usize,
    ) -> StoreResult<Vec<CreditTransaction>> {
        let mut entries: Vec<CreditTransaction> = self
            .credit_transactions
            .read()
            .await
            .entries
            .iter()
            .rev()
            .filter(|t| t.user_id == user)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.truncate(limit);
        Ok(entries)
    }

    async fn recent_credit_transactions(
        &self,
        kind: TransactionKind,
        limit: usize,
    ) -> StoreResult<Vec<CreditTransaction>> {
        let mut entries: Vec<CreditTransaction> = self
            .credit_transactions
            .read()
            .await
            .entries
            .iter()
            .rev()
            .filter(|t| t.kind == kind)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.truncate(limit);
        Ok(entries)
    }
}
