use axum::http::HeaderMap;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    state::AppState,
};

const DEV_ACCOUNT_HEADER: &str = "x-account-id";

#[derive(Debug, Deserialize)]
struct AccessClaims {
    #[serde(alias = "accountId")]
    account_id: String,
}

/// Resolves the caller's account from a verified bearer token. The account
/// is never taken from a request payload.
pub async fn require_account_id(state: &AppState, headers: &HeaderMap) -> AppResult<Uuid> {
    if state.config.auth_dev_overrides_enabled() {
        if let Some(account_id) = header_value(headers, DEV_ACCOUNT_HEADER) {
            return parse_account_id(&account_id);
        }
    }

    let token = bearer_token(headers)
        .ok_or_else(|| AppError::Unauthorized("Unauthorized: missing bearer token.".to_string()))?;
    let secret = state.config.auth_jwt_secret.as_deref().ok_or_else(|| {
        AppError::Dependency("Authentication is not configured. Set AUTH_JWT_SECRET.".to_string())
    })?;

    account_id_from_token(&token, secret)
}

fn account_id_from_token(token: &str, secret: &str) -> AppResult<Uuid> {
    let data = decode::<AccessClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|error| {
        tracing::debug!(error = %error, "Rejected access token");
        AppError::Unauthorized("Unauthorized: invalid token.".to_string())
    })?;

    parse_account_id(&data.claims.account_id)
}

fn parse_account_id(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| AppError::Unauthorized("Unauthorized: invalid account.".to_string()))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = header_value(headers, "authorization")?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}
