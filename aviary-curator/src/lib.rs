//! aviary-curator library - photo curation decisions for bird catalogs
//!
//! Decides what a user should photograph next, whether a gallery or the inbox
//! has room for another photo, and guards the HTTP surface with a fixed-window
//! rate limiter. Read models are served through a TTL cache.

use aviary_common::config::{AviaryConfig, RateLimitConfig};
use aviary_common::Clock;
use axum::Router;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod cache;
pub mod capacity;
pub mod error;
pub mod rate_limit;
pub mod store;
pub mod suggestions;
pub mod sweeper;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{ApiError, ApiResult};

use cache::TtlCache;
use capacity::CapacityManager;
use rate_limit::RateLimiter;
use store::CatalogStore;
use suggestions::SuggestionEngine;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CatalogStore>,
    pub cache: TtlCache,
    pub rate_limiter: RateLimiter,
    /// Limit applied to every `/api` request
    pub api_limit: RateLimitConfig,
    /// Peers allowed to name the client through `X-Forwarded-For`
    pub trusted_proxies: Arc<[IpAddr]>,
    pub capacity: CapacityManager,
    pub suggestions: SuggestionEngine,
}

impl AppState {
    /// Wire every component over one store and clock
    pub fn new(store: Arc<dyn CatalogStore>, clock: Arc<dyn Clock>, config: &AviaryConfig) -> Self {
        let cache = TtlCache::in_memory(clock.clone())
            .with_default_ttl(Duration::from_secs(config.cache.default_ttl_secs));

        Self {
            cache,
            rate_limiter: RateLimiter::in_memory(clock.clone()),
            api_limit: config.rate_limit.api,
            trusted_proxies: config.rate_limit.trusted_proxies.clone().into(),
            capacity: CapacityManager::new(store.clone()),
            suggestions: SuggestionEngine::new(store.clone(), clock),
            store,
        }
    }
}

/// Build application router
///
/// `/api` routes sit behind the rate limiter; `/health` does not. Serve with
/// `into_make_service_with_connect_info::<SocketAddr>()` so clients are keyed
/// by their socket address.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, post};

    let limited = Router::new()
        .route("/api/users/:user_id/suggestions", get(api::get_suggestions))
        .route(
            "/api/users/:user_id/capacity/species/:species_id",
            get(api::check_species_capacity),
        )
        .route("/api/users/:user_id/capacity/inbox", get(api::check_inbox_capacity))
        .route("/api/users/:user_id/detections/stats", get(api::get_detection_stats))
        .route("/api/users/:user_id/detections/link", post(api::link_detections))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::rate_limit_middleware,
        ));

    Router::new()
        .merge(limited)
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
