//! Turns `X-Cache-Invalidate` response headers into purge events.

use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};
use tracing::debug;

use super::CacheTrigger;

pub const CACHE_INVALIDATE_HEADER: &str = "x-cache-invalidate";

/// Publishes a purge for every successful response that carries the header.
/// The header itself is left in place for upstream proxies.
pub async fn purge_layer(
    State(trigger): State<CacheTrigger>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let response = next.run(request).await;
    if !response.status().is_success() {
        return response;
    }

    let value = response
        .headers()
        .get(CACHE_INVALIDATE_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    if let Some(value) = value {
        debug!(
            target = "quire::cache::middleware",
            invalidate = %value,
            "response requested purge"
        );
        trigger.invalidate_header(&value).await;
    }

    response
}
