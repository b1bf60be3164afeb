pub mod error;
pub mod handlers;
pub mod middleware;
pub mod rate_limit;
pub mod state;

pub use state::ApiState;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, put},
};

use crate::cache::purge_layer;
use crate::infra::http::RouterState;

pub const API_PREFIX: &str = "/api/admin";

pub fn build_api_router(state: RouterState) -> Router<RouterState> {
    let api_state = state.api.clone();

    let routes = Router::new()
        .route(
            "/posts",
            get(handlers::posts::browse).post(handlers::posts::add),
        )
        .route(
            "/posts/{id}",
            get(handlers::posts::read_by_id)
                .put(handlers::posts::edit)
                .delete(handlers::posts::destroy),
        )
        .route("/posts/slug/{slug}", get(handlers::posts::read_by_slug))
        .route("/posts/uuid/{uuid}", get(handlers::posts::read_by_uuid))
        .route(
            "/settings",
            get(handlers::settings::browse).put(handlers::settings::edit),
        )
        .route(
            "/settings/verifications",
            put(handlers::settings::verify_key_update),
        )
        .route(
            "/settings/stripe/connect",
            axum::routing::delete(handlers::settings::disconnect_stripe_connect),
        )
        .route(
            "/settings/routes/yaml",
            get(handlers::settings::download).post(handlers::settings::upload),
        )
        .route("/settings/{key}", get(handlers::settings::read))
        .route_layer(axum_middleware::from_fn_with_state(
            api_state.clone(),
            middleware::api_rate_limit,
        ))
        .route_layer(axum_middleware::from_fn_with_state(
            api_state.clone(),
            middleware::api_auth,
        ))
        .layer(axum_middleware::from_fn_with_state(
            api_state.cache.clone(),
            purge_layer,
        ))
        .layer(DefaultBodyLimit::max(api_state.max_request_bytes));

    Router::new().nest(API_PREFIX, routes)
}
