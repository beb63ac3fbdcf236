//! HTTP surface of the marketplace.

use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::Orchestrator;

pub mod auth;
mod error;
mod handlers;

pub use error::ApiError;

pub struct AppState {
    pub orchestrator: Orchestrator,
    pub jwt_secret: String,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator, jwt_secret: impl Into<String>) -> Self {
        Self {
            orchestrator,
            jwt_secret: jwt_secret.into(),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let public: Router<Arc<AppState>> = Router::new()
        .route("/market/categories", get(handlers::categories))
        .route("/market/items", get(handlers::list_items))
        .route("/market/items/:item_id", get(handlers::get_item))
        .route("/market/best-sellers", get(handlers::best_sellers))
        .route("/leaderboard/latest-purchases", get(handlers::latest_purchases))
        .route("/leaderboard/credits", get(handlers::richest_users))
        .route("/leaderboard/latest-loads", get(handlers::latest_loads));

    let members: Router<Arc<AppState>> = Router::new()
        .route("/market/purchase/:item_id", post(handlers::purchase))
        .route("/wallet/history", get(handlers::history))
        .route("/wallet/load", post(handlers::load))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::authenticate));

    // outermost layer runs first: authenticate, then the admin check
    let admins: Router<Arc<AppState>> = Router::new()
        .route("/admin/market/items", post(handlers::create_item))
        .route("/admin/wallet/:user_id/credit", post(handlers::admin_credit))
        .route_layer(middleware::from_fn(auth::require_admin))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::authenticate));

    Router::new()
        .nest("/api", public.merge(members).merge(admins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
