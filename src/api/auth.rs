use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use axum::Extension;
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::AppState;
use super::error::ApiError;
use crate::engine::WalletError;
use crate::model::{User, UserId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub exp: i64,
}

/// Sign an HS256 token for `user`. Tokens are normally issued by the site's
/// login service; this exists for tooling and tests.
pub fn issue_token(
    secret: &str,
    user: UserId,
    ttl: Duration,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        sub: user.to_string(),
        exp: (Utc::now() + ttl).timestamp(),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let token = headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")?
        .trim();
    (!token.is_empty()).then_some(token)
}

fn verify_token(secret: &str, token: &str) -> Result<Claims, ApiError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map(|data| data.claims)
    .map_err(|e| {
        debug!(error = %e, "token rejected");
        ApiError::Unauthenticated
    })
}

/// Resolve the bearer token to a user, re-read from the store, and make it
/// available to handlers as `Extension<User>`.
pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers()).ok_or(ApiError::Unauthenticated)?;
    let claims = verify_token(&state.jwt_secret, token)?;
    let user_id = Uuid::parse_str(&claims.sub).map_err(|_| ApiError::Unauthenticated)?;

    let user = match state.orchestrator.wallet().get_user(user_id).await {
        Ok(user) => user,
        Err(WalletError::UserNotFound(_)) => return Err(ApiError::Unauthenticated),
        Err(e) => return Err(e.into()),
    };

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// Must be layered inside [`authenticate`].
pub async fn require_admin(
    Extension(user): Extension<User>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !user.is_admin() {
        return Err(ApiError::Forbidden);
    }
    Ok(next.run(req).await)
}
