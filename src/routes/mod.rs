use axum::{routing::get, Router};

use crate::state::AppState;

pub mod health;
pub mod tax_reports;

pub fn v1_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .merge(tax_reports::router())
}
