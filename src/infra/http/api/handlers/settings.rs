use std::collections::BTreeMap;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, Multipart, Path, Query, State};
use axum::response::Response;
use serde_json::Value;
use tracing::debug;

use crate::infra::uploads::UploadStagingError;
use super::super::error::ApiError;
use super::super::middleware::Caller;
use super::super::state::ApiState;
use super::{json_body, respond, with_options};

/// Multipart field carrying the routes file.
const ROUTES_FIELD: &str = "routes";

type Options = Query<BTreeMap<String, String>>;

pub async fn browse(
    State(state): State<ApiState>,
    Extension(caller): Extension<Caller>,
    Query(options): Options,
) -> Result<Response, ApiError> {
    let frame = with_options(caller.frame(), options);
    Ok(respond(state.admin.settings.browse(frame).await?))
}

pub async fn read(
    State(state): State<ApiState>,
    Extension(caller): Extension<Caller>,
    Path(key): Path<String>,
    Query(options): Options,
) -> Result<Response, ApiError> {
    let frame = with_options(caller.frame(), options).with_option("key", key);
    Ok(respond(state.admin.settings.read(frame).await?))
}

pub async fn edit(
    State(state): State<ApiState>,
    Extension(caller): Extension<Caller>,
    Query(options): Options,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let frame = with_options(caller.frame(), options).with_data(json_body(body)?);
    Ok(respond(state.admin.settings.edit(frame).await?))
}

pub async fn verify_key_update(
    State(state): State<ApiState>,
    Extension(caller): Extension<Caller>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let frame = caller.frame().with_data(json_body(body)?);
    Ok(respond(state.admin.settings.verify_key_update(frame).await?))
}

pub async fn disconnect_stripe_connect(
    State(state): State<ApiState>,
    Extension(caller): Extension<Caller>,
) -> Result<Response, ApiError> {
    Ok(respond(
        state
            .admin
            .settings
            .disconnect_stripe_connect_integration(caller.frame())
            .await?,
    ))
}

pub async fn upload(
    State(state): State<ApiState>,
    Extension(caller): Extension<Caller>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut frame = caller.frame();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(UploadStagingError::Stream)?
    {
        if field.name() != Some(ROUTES_FIELD) {
            debug!(
                target = "quire::api::settings",
                field = field.name().unwrap_or(""),
                "ignoring multipart field"
            );
            continue;
        }
        let staged = state.uploads.stage_field(field).await?;
        frame = frame.with_file(staged);
        break;
    }

    Ok(respond(state.admin.settings.upload(frame).await?))
}

pub async fn download(
    State(state): State<ApiState>,
    Extension(caller): Extension<Caller>,
) -> Result<Response, ApiError> {
    Ok(respond(state.admin.settings.download(caller.frame()).await?))
}
