//! Core domain records for the marketplace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Amount, Discount};

/// User identifier.
pub type UserId = Uuid;

/// Market item identifier.
pub type ItemId = Uuid;

/// Site role, only used to gate admin routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Member,
    Admin,
}

/// The wallet-relevant part of a registered user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub role: Role,
    /// Never negative; only changed through the wallet.
    pub credit_balance: Amount,
}

impl User {
    pub fn new(username: impl Into<String>, credit_balance: Amount) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            role: Role::Member,
            credit_balance,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// An item sold in the in-game market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketItem {
    pub id: ItemId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Amount,
    pub stock: u32,
    #[serde(default)]
    pub discount: Discount,
    pub category: String,
    #[serde(default)]
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl MarketItem {
    pub fn new(name: impl Into<String>, category: impl Into<String>, price: Amount, stock: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            price,
            stock,
            discount: Discount::NONE,
            category: category.into(),
            image: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_discount(mut self, discount: Discount) -> Self {
        self.discount = discount;
        self
    }

    /// Price charged after discount.
    pub fn effective_price(&self) -> Amount {
        self.discount.apply(self.price)
    }

    pub fn in_stock(&self) -> bool {
        self.stock > 0
    }
}

/// Append-only record of a completed sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    pub id: Uuid,
    pub user_id: UserId,
    pub item_id: ItemId,
    /// Item name at the time of sale.
    pub item_name: String,
    /// Price actually charged, discount included.
    pub price_paid: Amount,
    #[serde(rename = "timestamp")]
    pub purchased_at: DateTime<Utc>,
}

impl PurchaseRecord {
    pub fn new(user_id: UserId, item: &MarketItem, price_paid: Amount) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            item_id: item.id,
            item_name: item.name.clone(),
            price_paid,
            purchased_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionKind {
    /// Top-up through a payment provider.
    Load,
    PurchaseDebit,
    /// Credit returned by a compensated purchase.
    Refund,
    /// Manual change made by an admin.
    Adjustment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

/// Wallet ledger entry. `amount` is signed: debits are negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditTransaction {
    pub id: Uuid,
    pub user_id: UserId,
    pub amount: Amount,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl CreditTransaction {
    pub fn completed(user_id: UserId, amount: Amount, kind: TransactionKind) -> Self {
        Self::with_status(user_id, amount, kind, TransactionStatus::Completed)
    }

    pub fn pending(user_id: UserId, amount: Amount, kind: TransactionKind) -> Self {
        Self::with_status(user_id, amount, kind, TransactionStatus::Pending)
    }

    fn with_status(
        user_id: UserId,
        amount: Amount,
        kind: TransactionKind,
        status: TransactionStatus,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            amount,
            kind,
            status,
            created_at: Utc::now(),
        }
    }
}
