use std::sync::Arc;

use axum::Extension;
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AppState;
use super::error::{ApiError, ITEM_NOT_FOUND, USER_NOT_FOUND};
use crate::engine::{Confirmation, LoadSummary, PurchaseSummary};
use crate::model::{CreditTransaction, ItemId, MarketItem, TransactionKind, User};
use crate::{Amount, Discount};

const HISTORY_LIMIT: usize = 100;
const BOARD_LIMIT: usize = 10;

#[derive(Debug, Serialize)]
pub struct PurchaseResponse {
    pub message: &'static str,
    pub new_balance: Amount,
    pub confirmation: Confirmation,
}

#[derive(Debug, Deserialize)]
pub struct AmountRequest {
    pub amount: Amount,
}

#[derive(Debug, Serialize)]
pub struct LoadResponse {
    pub message: &'static str,
    pub transaction_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub message: &'static str,
    pub new_balance: Amount,
}

#[derive(Debug, Serialize)]
pub struct BalanceEntry {
    pub username: String,
    pub credit_balance: Amount,
}

#[derive(Debug, Deserialize)]
pub struct ItemsQuery {
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateItemRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: f64,
    pub stock: i64,
    #[serde(default)]
    pub discount: f64,
    pub category: String,
    #[serde(default)]
    pub image: Option<String>,
}

impl CreateItemRequest {
    fn validate(self) -> Result<MarketItem, ApiError> {
        let invalid = |reason: &str| ApiError::BadRequest(format!("Geçersiz ürün: {reason}"));

        if self.name.trim().is_empty() {
            return Err(invalid("isim boş olamaz"));
        }
        if self.category.trim().is_empty() {
            return Err(invalid("kategori boş olamaz"));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(invalid("fiyat negatif olamaz"));
        }
        let price = Amount::try_from_float(self.price)
            .map_err(|_| invalid("fiyat en fazla iki ondalık basamak içerebilir"))?;
        let stock = u32::try_from(self.stock).map_err(|_| invalid("stok negatif olamaz"))?;
        let discount = Discount::from_percent(self.discount)
            .map_err(|_| invalid("indirim 0 ile 100 arasında olmalı"))?;

        let mut item = MarketItem::new(
            self.name.trim(),
            self.category.trim(),
            price,
            stock,
        )
        .with_discount(discount);
        item.description = self.description;
        item.image = self.image;
        Ok(item)
    }
}

#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    pub message: &'static str,
    pub id: ItemId,
}

fn parse_id(raw: &str, missing: &'static str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::NotFound(missing))
}

pub async fn purchase(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(item_id): Path<String>,
) -> Result<Json<PurchaseResponse>, ApiError> {
    let item_id = parse_id(&item_id, ITEM_NOT_FOUND)?;
    let receipt = state.orchestrator.purchase(user.id, item_id).await?;

    Ok(Json(PurchaseResponse {
        message: "Satın alma başarılı",
        new_balance: receipt.new_balance,
        confirmation: receipt.confirmation,
    }))
}

pub async fn history(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<CreditTransaction>>, ApiError> {
    let entries = state
        .orchestrator
        .wallet()
        .history(user.id, HISTORY_LIMIT)
        .await?;
    Ok(Json(entries))
}

pub async fn load(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    body: Result<Json<AmountRequest>, JsonRejection>,
) -> Result<Json<LoadResponse>, ApiError> {
    let Json(req) = body?;
    let entry = state
        .orchestrator
        .wallet()
        .request_load(user.id, req.amount)
        .await?;

    Ok(Json(LoadResponse {
        message: "Ödeme başlatıldı",
        transaction_id: entry.id,
    }))
}

pub async fn admin_credit(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    body: Result<Json<AmountRequest>, JsonRejection>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let user_id = parse_id(&user_id, USER_NOT_FOUND)?;
    let Json(req) = body?;
    let new_balance = state
        .orchestrator
        .wallet()
        .credit(user_id, req.amount, TransactionKind::Adjustment)
        .await?;

    Ok(Json(BalanceResponse {
        message: "Kredi eklendi",
        new_balance,
    }))
}

pub async fn categories(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.orchestrator.catalog().categories().await?))
}

pub async fn list_items(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ItemsQuery>,
) -> Result<Json<Vec<MarketItem>>, ApiError> {
    let items = state
        .orchestrator
        .catalog()
        .list(query.category.as_deref())
        .await?;
    Ok(Json(items))
}

pub async fn get_item(
    State(state): State<Arc<AppState>>,
    Path(item_id): Path<String>,
) -> Result<Json<MarketItem>, ApiError> {
    let item_id = parse_id(&item_id, ITEM_NOT_FOUND)?;
    Ok(Json(state.orchestrator.catalog().get_item(item_id).await?))
}

pub async fn best_sellers(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<MarketItem>>, ApiError> {
    Ok(Json(
        state.orchestrator.catalog().best_sellers(BOARD_LIMIT).await?,
    ))
}

pub async fn latest_purchases(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<PurchaseSummary>>, ApiError> {
    Ok(Json(
        state.orchestrator.latest_purchases(BOARD_LIMIT).await?,
    ))
}

pub async fn richest_users(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<BalanceEntry>>, ApiError> {
    let users = state.orchestrator.wallet().richest(BOARD_LIMIT).await?;
    Ok(Json(
        users
            .into_iter()
            .map(|user| BalanceEntry {
                username: user.username,
                credit_balance: user.credit_balance,
            })
            .collect(),
    ))
}

pub async fn latest_loads(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<LoadSummary>>, ApiError> {
    Ok(Json(state.orchestrator.wallet().latest_loads(BOARD_LIMIT).await?))
}

pub async fn create_item(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CreateItemRequest>, JsonRejection>,
) -> Result<Json<CreatedResponse>, ApiError> {
    let Json(req) = body?;
    let item = req.validate()?;
    let id = state.orchestrator.catalog().add_item(item).await?;

    Ok(Json(CreatedResponse {
        message: "Ürün oluşturuldu",
        id,
    }))
}
