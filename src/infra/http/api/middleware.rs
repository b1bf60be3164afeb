use std::collections::BTreeMap;

use axum::body::Body;
use axum::extract::{MatchedPath, State};
use axum::http::{HeaderMap, Request, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use metrics::counter;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::application::api_keys::ApiAuthError;
use crate::application::frame::{Frame, RequestContext};

use super::error::ApiError;
use super::state::ApiState;

const API_KEY_HEADER: &str = "x-api-key";
const SESSION_HEADER_PREFIX: &str = "x-quire-session-";

/// Authenticated caller attached to each admin API request.
#[derive(Debug, Clone)]
pub struct Caller {
    pub context: RequestContext,
    pub session: BTreeMap<String, String>,
    /// Stable identity used for rate limiting and logs.
    pub label: String,
}

impl Caller {
    /// Start a frame for this caller, session properties included.
    pub fn frame(&self) -> Frame {
        let mut frame = Frame::new(self.context.clone());
        frame.session = self.session.clone();
        frame
    }
}

/// Resolve the caller from an integration API key or, when configured, the
/// trusted staff header.
pub async fn api_auth(
    State(state): State<ApiState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let caller = match authenticate(&state, request.headers()).await {
        Ok(caller) => caller,
        Err(err) => return err.into_response(),
    };

    debug!(
        target = "quire::api::auth",
        caller = %caller.label,
        "admin api caller resolved"
    );
    request.extensions_mut().insert(caller.clone());

    let mut response = next.run(request).await;
    response.extensions_mut().insert(caller);
    response
}

pub async fn api_rate_limit(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let Some(caller) = request.extensions().get::<Caller>() else {
        warn!(
            target = "quire::api::ratelimit",
            "missing caller in rate limit middleware"
        );
        return ApiError::unauthorized().into_response();
    };

    let key = format!("{}:{}", request.method(), caller.label);
    if !state.rate_limiter.allow(&key, &route).0 {
        counter!("quire_api_rate_limited_total").increment(1);
        return ApiError::RateLimited {
            retry_after: state.rate_limiter.retry_after_secs(),
        }
        .into_response();
    }

    next.run(request).await
}

async fn authenticate(state: &ApiState, headers: &HeaderMap) -> Result<Caller, ApiError> {
    let session = session_props(headers);

    if let Some(token) = api_token(headers) {
        let principal = state
            .api_keys
            .authenticate(&token)
            .await
            .map_err(|err| match err {
                ApiAuthError::Inactive => ApiError::Unauthorized("API key is no longer active"),
                ApiAuthError::Missing | ApiAuthError::Invalid => ApiError::unauthorized(),
            })?;
        return Ok(Caller {
            context: RequestContext::integration(principal.integration_id),
            session,
            label: format!("api_key:{}", principal.prefix),
        });
    }

    let user = state
        .trusted_user_header
        .as_deref()
        .and_then(|name| headers.get(name))
        .and_then(|value| value.to_str().ok())
        .ok_or_else(ApiError::unauthorized)?;
    let user_id = Uuid::parse_str(user.trim())
        .map_err(|_| ApiError::Unauthorized("Malformed staff user id"))?;

    Ok(Caller {
        context: RequestContext::user(user_id),
        session,
        label: format!("user:{user_id}"),
    })
}

fn api_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| raw.strip_prefix("Bearer "))
        .map(str::trim);
    let api_key = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim);

    bearer
        .or(api_key)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

fn session_props(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            let prop = name.as_str().strip_prefix(SESSION_HEADER_PREFIX)?;
            let value = value.to_str().ok()?;
            Some((prop.to_string(), value.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn bearer_token_wins_over_api_key_header() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer sk_a_b"));
        headers.insert(API_KEY_HEADER, HeaderValue::from_static("sk_c_d"));
        assert_eq!(api_token(&headers).as_deref(), Some("sk_a_b"));

        headers.remove(header::AUTHORIZATION);
        assert_eq!(api_token(&headers).as_deref(), Some("sk_c_d"));
    }

    #[test]
    fn blank_tokens_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, HeaderValue::from_static("  "));
        assert!(api_token(&headers).is_none());
    }

    #[test]
    fn session_headers_become_props() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-quire-session-origin",
            HeaderValue::from_static("https://admin.example.com"),
        );
        headers.insert(
            "x-quire-session-stripe-connect-state",
            HeaderValue::from_static("nonce"),
        );
        headers.insert("x-other", HeaderValue::from_static("skip"));

        let props = session_props(&headers);
        assert_eq!(props.len(), 2);
        assert_eq!(
            props.get("origin").map(String::as_str),
            Some("https://admin.example.com")
        );
        assert_eq!(
            props.get("stripe-connect-state").map(String::as_str),
            Some("nonce")
        );
    }
}
