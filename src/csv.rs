use std::fs::File;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tokio_stream::{Stream, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use crate::model::{MarketItem, Role, User};
use crate::store::LedgerStore;
use crate::{Amount, Discount};

/// Errors that can occur when reading snapshot rows
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to open snapshot: {0}")]
    Open(csv::Error),

    #[error("line {line}: failed to parse row: {source}")]
    Parse { line: usize, source: csv::Error },

    #[error("line {line}: {reason}")]
    Invalid { line: usize, reason: String },
}

#[derive(Debug, Deserialize)]
struct UserRow {
    id: Option<Uuid>,
    username: String,
    role: Option<Role>,
    credit_balance: String,
}

#[derive(Debug, Deserialize)]
struct ItemRow {
    id: Option<Uuid>,
    name: String,
    category: String,
    price: String,
    stock: u32,
    discount: Option<f64>,
}

/// One record of a store snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotRow {
    User(User),
    Item(MarketItem),
}

/// What an [`import`] run did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub users: usize,
    pub items: usize,
    pub skipped: usize,
}

fn open(path: impl AsRef<Path>) -> Result<csv::Reader<File>, SnapshotError> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(SnapshotError::Open)
}

fn parse_amount(line: usize, field: &str, raw: &str) -> Result<Amount, SnapshotError> {
    raw.parse().map_err(|e| SnapshotError::Invalid {
        line,
        reason: format!("{field}: {e}"),
    })
}

/// Read users from a csv file with header `id,username,role,credit_balance`.
/// An empty `id` gets a fresh one, an empty `role` means member.
pub fn read_users(
    path: impl AsRef<Path>,
) -> Result<impl Iterator<Item = Result<User, SnapshotError>>, SnapshotError> {
    let reader = open(path)?;

    Ok(reader
        .into_deserialize::<UserRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            let row = result.map_err(|source| SnapshotError::Parse { line, source })?;
            if row.username.is_empty() {
                return Err(SnapshotError::Invalid {
                    line,
                    reason: "username is empty".to_string(),
                });
            }
            let credit_balance = parse_amount(line, "credit_balance", &row.credit_balance)?;
            if credit_balance.is_negative() {
                return Err(SnapshotError::Invalid {
                    line,
                    reason: format!("credit_balance must not be negative, got {credit_balance}"),
                });
            }

            let mut user = User::new(row.username, credit_balance);
            user.id = row.id.unwrap_or(user.id);
            user.role = row.role.unwrap_or_default();
            Ok(user)
        }))
}

/// Read market items from a csv file with header
/// `id,name,category,price,stock,discount`. `discount` is a percentage.
pub fn read_items(
    path: impl AsRef<Path>,
) -> Result<impl Iterator<Item = Result<MarketItem, SnapshotError>>, SnapshotError> {
    let reader = open(path)?;

    Ok(reader
        .into_deserialize::<ItemRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2;
            let row = result.map_err(|source| SnapshotError::Parse { line, source })?;
            if row.name.is_empty() || row.category.is_empty() {
                return Err(SnapshotError::Invalid {
                    line,
                    reason: "name and category are required".to_string(),
                });
            }
            let price = parse_amount(line, "price", &row.price)?;
            if price.is_negative() {
                return Err(SnapshotError::Invalid {
                    line,
                    reason: format!("price must not be negative, got {price}"),
                });
            }
            let discount = match row.discount {
                Some(percent) => Discount::from_percent(percent).map_err(|e| SnapshotError::Invalid {
                    line,
                    reason: e.to_string(),
                })?,
                None => Discount::NONE,
            };

            let mut item = MarketItem::new(row.name, row.category, price, row.stock).with_discount(discount);
            item.id = row.id.unwrap_or(item.id);
            Ok(item)
        }))
}

/// Load snapshot rows into `store`. Rows the store refuses (duplicate ids,
/// outages) are logged and skipped.
pub async fn import(
    store: &dyn LedgerStore,
    mut rows: impl Stream<Item = SnapshotRow> + Unpin,
) -> ImportSummary {
    let mut summary = ImportSummary::default();

    while let Some(row) = rows.next().await {
        let result = match row {
            SnapshotRow::User(user) => {
                let id = user.id;
                store.insert_user(user).await.map(|_| summary.users += 1).map_err(|e| (id, e))
            }
            SnapshotRow::Item(item) => {
                let id = item.id;
                store.insert_item(item).await.map(|_| summary.items += 1).map_err(|e| (id, e))
            }
        };
        if let Err((id, e)) = result {
            warn!(id = %id, reason = %e, "snapshot row skipped");
            summary.skipped += 1;
        }
    }

    info!(users = summary.users, items = summary.items, skipped = summary.skipped, "snapshot imported");
    summary
}
