//! Rate-limit middleware
//!
//! Every `/api` request counts against a fixed window for its client
//! identifier. Rejected requests get 429 with `Retry-After`; all responses
//! carry `X-RateLimit-*` headers.
//!
//! Clients are keyed by socket address. `X-Forwarded-For` is only read when
//! the peer is a configured trusted proxy, since any client can set it.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::net::{IpAddr, SocketAddr};
use tracing::warn;

use crate::error::{insert_rate_limit_headers, ApiError};
use crate::AppState;

/// Identifier used when the peer address is unknown
pub const ANONYMOUS: &str = "anonymous";

/// Client identifier for rate limiting
///
/// The peer address, or the first `X-Forwarded-For` address when the peer is
/// in `trusted_proxies`. Without a peer address every request shares
/// [`ANONYMOUS`].
pub fn client_identifier(
    peer: Option<IpAddr>,
    headers: &HeaderMap,
    trusted_proxies: &[IpAddr],
) -> String {
    let Some(peer) = peer else {
        return ANONYMOUS.to_string();
    };

    if trusted_proxies.contains(&peer) {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|v| v.trim().parse::<IpAddr>().ok());
        if let Some(client) = forwarded {
            return client.to_string();
        }
    }

    peer.to_string()
}

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let identifier = client_identifier(peer, request.headers(), &state.trusted_proxies);
    let limit = state.api_limit;
    let decision = state.rate_limiter.check_rate_limit(&identifier, &limit);

    if !decision.allowed {
        let retry_after = state.rate_limiter.retry_after(&decision);
        let retry_after_secs = (retry_after.as_millis().div_ceil(1000) as u64).max(1);
        warn!(
            identifier = %identifier,
            path = %request.uri().path(),
            retry_after_secs,
            "Rejected rate-limited request"
        );
        return Err(ApiError::RateLimited {
            limit: limit.max_requests,
            decision,
            retry_after_secs,
        });
    }

    let mut response = next.run(request).await;
    insert_rate_limit_headers(response.headers_mut(), limit.max_requests, &decision);
    Ok(response)
}
