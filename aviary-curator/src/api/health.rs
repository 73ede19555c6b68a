//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
    /// Live entries in the response cache
    pub cache_entries: usize,
    /// Identifiers with an open rate-limit window
    pub rate_limited_clients: usize,
}

/// GET /health
///
/// Not rate limited.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        module: "aviary-curator".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        cache_entries: state.cache.len(),
        rate_limited_clients: state.rate_limiter.tracked(),
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
