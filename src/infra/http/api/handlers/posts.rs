use std::collections::BTreeMap;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, Path, Query, State};
use axum::response::Response;
use serde_json::{Value, json};

use super::super::error::ApiError;
use super::super::middleware::Caller;
use super::super::state::ApiState;
use super::{json_body, respond, with_options};

type Options = Query<BTreeMap<String, String>>;

pub async fn browse(
    State(state): State<ApiState>,
    Extension(caller): Extension<Caller>,
    Query(options): Options,
) -> Result<Response, ApiError> {
    let frame = with_options(caller.frame(), options);
    Ok(respond(state.admin.posts.browse(frame).await?))
}

pub async fn read_by_id(
    State(state): State<ApiState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    Query(options): Options,
) -> Result<Response, ApiError> {
    read(state, caller, options, json!({ "id": id })).await
}

pub async fn read_by_slug(
    State(state): State<ApiState>,
    Extension(caller): Extension<Caller>,
    Path(slug): Path<String>,
    Query(options): Options,
) -> Result<Response, ApiError> {
    read(state, caller, options, json!({ "slug": slug })).await
}

pub async fn read_by_uuid(
    State(state): State<ApiState>,
    Extension(caller): Extension<Caller>,
    Path(uuid): Path<String>,
    Query(options): Options,
) -> Result<Response, ApiError> {
    read(state, caller, options, json!({ "uuid": uuid })).await
}

async fn read(
    state: ApiState,
    caller: Caller,
    options: BTreeMap<String, String>,
    data: Value,
) -> Result<Response, ApiError> {
    let frame = with_options(caller.frame(), options).with_data(data);
    Ok(respond(state.admin.posts.read(frame).await?))
}

pub async fn add(
    State(state): State<ApiState>,
    Extension(caller): Extension<Caller>,
    Query(options): Options,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let frame = with_options(caller.frame(), options).with_data(json_body(body)?);
    Ok(respond(state.admin.posts.add(frame).await?))
}

pub async fn edit(
    State(state): State<ApiState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    Query(options): Options,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let frame = with_options(caller.frame(), options)
        .with_option("id", id)
        .with_data(json_body(body)?);
    Ok(respond(state.admin.posts.edit(frame).await?))
}

pub async fn destroy(
    State(state): State<ApiState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    Query(options): Options,
) -> Result<Response, ApiError> {
    let frame = with_options(caller.frame(), options).with_option("id", id);
    Ok(respond(state.admin.posts.destroy(frame).await?))
}
