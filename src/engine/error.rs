//! Error types for wallet, catalog and purchase processing.

use thiserror::Error;

use crate::Amount;
use crate::model::{ItemId, UserId};
use crate::store::StoreError;

/// Error from a wallet operation.
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("user {0} not found")]
    UserNotFound(UserId),

    #[error("amount must be positive, got {0}")]
    InvalidAmount(Amount),

    #[error("insufficient credit for user {0}: balance {1}, requested {2}")]
    InsufficientCredit(UserId, Amount, Amount),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Consistency(#[from] ConsistencyError),
}

impl WalletError {
    /// Only store outages are worth retrying; everything else is a decision.
    pub fn is_transient(&self) -> bool {
        matches!(self, WalletError::Store(_))
    }
}

/// Error from a catalog operation.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("item {0} not found")]
    ItemNotFound(ItemId),

    #[error("item {0} is out of stock")]
    OutOfStock(ItemId),

    #[error("invalid item: {0}")]
    Invalid(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CatalogError {
    pub fn is_transient(&self) -> bool {
        matches!(self, CatalogError::Store(_))
    }
}

/// Credit or stock left changed without the matching record, after every
/// attempt to undo it failed. Needs manual reconciliation.
#[derive(Debug, Error)]
#[error("{action} failed for user {user_id} (item {item_id:?}, amount {amount}): {reason}")]
pub struct ConsistencyError {
    pub action: &'static str,
    pub user_id: UserId,
    pub item_id: Option<ItemId>,
    pub amount: Amount,
    pub reason: String,
}

/// Top-level error returned by [`Orchestrator::purchase`](super::Orchestrator::purchase).
#[derive(Debug, Error)]
pub enum PurchaseError {
    #[error("user {0} not found")]
    UserNotFound(UserId),

    #[error("item {0} not found")]
    ItemNotFound(ItemId),

    #[error("item {0} is out of stock")]
    OutOfStock(ItemId),

    #[error("insufficient credit: balance {balance}, price {price}")]
    InsufficientCredit { balance: Amount, price: Amount },

    #[error("store failure: {0}")]
    Store(#[from] StoreError),

    #[error("consistency failure: {0}")]
    Consistency(#[from] ConsistencyError),
}

impl From<WalletError> for PurchaseError {
    fn from(err: WalletError) -> Self {
        match err {
            WalletError::UserNotFound(user) => PurchaseError::UserNotFound(user),
            WalletError::InsufficientCredit(_, balance, price) => {
                PurchaseError::InsufficientCredit { balance, price }
            }
            // the orchestrator never debits a non-positive price
            WalletError::InvalidAmount(price) => PurchaseError::InsufficientCredit {
                balance: Amount::ZERO,
                price,
            },
            WalletError::Store(e) => PurchaseError::Store(e),
            WalletError::Consistency(e) => PurchaseError::Consistency(e),
        }
    }
}

impl From<CatalogError> for PurchaseError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::ItemNotFound(item) => PurchaseError::ItemNotFound(item),
            CatalogError::OutOfStock(item) => PurchaseError::OutOfStock(item),
            CatalogError::Invalid(reason) => {
                PurchaseError::Store(StoreError::Unavailable(reason))
            }
            CatalogError::Store(e) => PurchaseError::Store(e),
        }
    }
}
