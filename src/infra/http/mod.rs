pub mod api;
mod middleware;

pub use api::rate_limit::ApiRateLimiter;
pub use api::{ApiState, build_api_router};
pub use middleware::RequestId;

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{FromRef, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Router, middleware as axum_middleware};

use crate::application::error::ErrorReport;
use crate::application::repos::RepoError;
use crate::infra::db::{PostgresRepositories, map_sqlx_error};

/// Liveness probe for the backing store.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn ping(&self) -> Result<(), RepoError>;
}

#[async_trait]
impl HealthProbe for PostgresRepositories {
    async fn ping(&self) -> Result<(), RepoError> {
        self.health_check().await.map_err(map_sqlx_error)
    }
}

#[derive(Clone)]
pub struct RouterState {
    pub api: ApiState,
    pub health: Arc<dyn HealthProbe>,
}

impl FromRef<RouterState> for ApiState {
    fn from_ref(state: &RouterState) -> Self {
        state.api.clone()
    }
}

pub fn build_router(state: RouterState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(build_api_router(state.clone()))
        .with_state(state)
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_id))
}

async fn health(State(state): State<RouterState>) -> Response {
    match state.health.ping().await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}
