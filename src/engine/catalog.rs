use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{info, warn};

use super::error::CatalogError;
use super::retry::{RetryPolicy, landed};
use crate::Amount;
use crate::model::{ItemId, MarketItem};
use crate::store::{Increment, LedgerStore, UpdateOutcome};

/// Category name the site uses for "no filter".
pub const ALL_CATEGORIES: &str = "Tümü";

/// Stock and price lookups for market items.
#[derive(Clone)]
pub struct Catalog {
    store: Arc<dyn LedgerStore>,
    policy: RetryPolicy,
}

impl Catalog {
    pub fn new(store: Arc<dyn LedgerStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    pub async fn get_item(&self, id: ItemId) -> Result<MarketItem, CatalogError> {
        self.policy
            .call(self.store.find_item(id))
            .await?
            .ok_or(CatalogError::ItemNotFound(id))
    }

    /// Take one unit out of stock and return the price to charge for it.
    ///
    /// The decrement is conditional on `stock > 0` at apply time, so two
    /// callers racing for the last unit cannot both win.
    pub async fn reserve_and_decrement(&self, id: ItemId) -> Result<Amount, CatalogError> {
        let item = self.get_item(id).await?;
        if !item.in_stock() {
            return Err(CatalogError::OutOfStock(id));
        }

        let outcome = self
            .policy
            .call(self.store.increment_stock(id, Increment::guarded(-1, 1)))
            .await?;

        match outcome {
            UpdateOutcome::Applied(remaining) => {
                info!(item = %id, remaining, "stock reserved");
                Ok(item.effective_price())
            }
            UpdateOutcome::PreconditionFailed(_) => Err(CatalogError::OutOfStock(id)),
            UpdateOutcome::NotFound => Err(CatalogError::ItemNotFound(id)),
        }
    }

    /// Put one unit back. Used to undo a reservation.
    pub async fn restock(&self, id: ItemId) -> Result<u32, CatalogError> {
        let outcome = self
            .policy
            .call(self.store.increment_stock(id, Increment::unconditional(1)))
            .await?;

        match outcome {
            UpdateOutcome::Applied(stock) => {
                warn!(item = %id, stock, "reservation returned to stock");
                Ok(stock)
            }
            UpdateOutcome::PreconditionFailed(_) | UpdateOutcome::NotFound => {
                Err(CatalogError::ItemNotFound(id))
            }
        }
    }

    /// Items in `category`; [`ALL_CATEGORIES`] or `None` lists everything.
    pub async fn list(&self, category: Option<&str>) -> Result<Vec<MarketItem>, CatalogError> {
        let filter = category.filter(|c| *c != ALL_CATEGORIES);
        Ok(self.policy.call(self.store.list_items(filter)).await?)
    }

    /// Distinct categories of the listed items, sorted.
    pub async fn categories(&self) -> Result<Vec<String>, CatalogError> {
        let items = self.policy.call(self.store.list_items(None)).await?;
        let names: BTreeSet<String> = items.into_iter().map(|item| item.category).collect();
        Ok(names.into_iter().collect())
    }

    /// Items ranked by number of sales.
    pub async fn best_sellers(&self, limit: usize) -> Result<Vec<MarketItem>, CatalogError> {
        let ranked = self.policy.call(self.store.best_selling(limit)).await?;
        let mut items = Vec::with_capacity(ranked.len());
        for (id, _) in ranked {
            // items removed from the catalog keep their sales but are not listed
            if let Some(item) = self.policy.call(self.store.find_item(id)).await? {
                items.push(item);
            }
        }
        Ok(items)
    }

    pub async fn add_item(&self, item: MarketItem) -> Result<ItemId, CatalogError> {
        if item.name.trim().is_empty() {
            return Err(CatalogError::Invalid("name must not be empty".to_string()));
        }
        if item.category.trim().is_empty() {
            return Err(CatalogError::Invalid("category must not be empty".to_string()));
        }
        if item.price.is_negative() {
            return Err(CatalogError::Invalid(format!("price must not be negative, got {}", item.price)));
        }

        let id = item.id;
        let store = &*self.store;
        self.policy
            .retry_store("item insert", || {
                let item = item.clone();
                async move { landed(store.insert_item(item).await) }
            })
            .await?;
        info!(item = %id, "item added to catalog");
        Ok(id)
    }
}
