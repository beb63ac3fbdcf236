use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::engine::{CatalogError, PurchaseError, WalletError};
use crate::store::StoreError;

pub const UNAUTHENTICATED: &str = "Kimlik doğrulanamadı";
pub const FORBIDDEN: &str = "Yönetici yetkisi gerekli";
pub const USER_NOT_FOUND: &str = "Kullanıcı bulunamadı";
pub const ITEM_NOT_FOUND: &str = "Ürün bulunamadı";
pub const OUT_OF_STOCK: &str = "Stok tükendi";
pub const INSUFFICIENT_CREDIT: &str = "Yetersiz kredi";
const INVALID_AMOUNT: &str = "Geçersiz miktar";
const UNAVAILABLE: &str = "Servis geçici olarak kullanılamıyor";
const INTERNAL: &str = "Beklenmeyen bir hata oluştu";

/// Everything a handler can fail with. Rendered as `{"detail": reason}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Kimlik doğrulanamadı")]
    Unauthenticated,

    #[error("Yönetici yetkisi gerekli")]
    Forbidden,

    #[error("{0}")]
    NotFound(&'static str),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Purchase(#[from] PurchaseError),

    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    fn status_and_detail(&self) -> (StatusCode, String) {
        let (status, detail) = match self {
            ApiError::Unauthenticated => (StatusCode::UNAUTHORIZED, UNAUTHENTICATED),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, FORBIDDEN),
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, *detail),
            ApiError::BadRequest(detail) => return (StatusCode::BAD_REQUEST, detail.clone()),

            ApiError::Purchase(e) => match e {
                PurchaseError::UserNotFound(_) => (StatusCode::NOT_FOUND, USER_NOT_FOUND),
                PurchaseError::ItemNotFound(_) => (StatusCode::NOT_FOUND, ITEM_NOT_FOUND),
                PurchaseError::OutOfStock(_) => (StatusCode::BAD_REQUEST, OUT_OF_STOCK),
                PurchaseError::InsufficientCredit { .. } => {
                    (StatusCode::BAD_REQUEST, INSUFFICIENT_CREDIT)
                }
                PurchaseError::Store(_) => (StatusCode::SERVICE_UNAVAILABLE, UNAVAILABLE),
                PurchaseError::Consistency(_) => (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL),
            },

            ApiError::Wallet(e) => match e {
                WalletError::UserNotFound(_) => (StatusCode::NOT_FOUND, USER_NOT_FOUND),
                WalletError::InvalidAmount(_) => (StatusCode::BAD_REQUEST, INVALID_AMOUNT),
                WalletError::InsufficientCredit(..) => {
                    (StatusCode::BAD_REQUEST, INSUFFICIENT_CREDIT)
                }
                WalletError::Store(_) => (StatusCode::SERVICE_UNAVAILABLE, UNAVAILABLE),
                WalletError::Consistency(_) => (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL),
            },

            ApiError::Catalog(e) => match e {
                CatalogError::ItemNotFound(_) => (StatusCode::NOT_FOUND, ITEM_NOT_FOUND),
                CatalogError::OutOfStock(_) => (StatusCode::BAD_REQUEST, OUT_OF_STOCK),
                CatalogError::Invalid(reason) => {
                    return (StatusCode::BAD_REQUEST, reason.clone());
                }
                CatalogError::Store(_) => (StatusCode::SERVICE_UNAVAILABLE, UNAVAILABLE),
            },

            ApiError::Store(_) => (StatusCode::SERVICE_UNAVAILABLE, UNAVAILABLE),
        };
        (status, detail.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = self.status_and_detail();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "request failed");
        }
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}
