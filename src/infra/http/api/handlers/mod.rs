//! Translate HTTP requests into endpoint frames and endpoint results back
//! into responses.

pub mod posts;
pub mod settings;

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::Value;

use crate::application::frame::Frame;
use crate::application::pipeline::{Body, EndpointResponse, ResponseFormat};
use crate::cache::CACHE_INVALIDATE_HEADER;

use super::error::ApiError;

const YAML_CONTENT_TYPE: &str = "application/yaml; charset=utf-8";

pub(crate) fn with_options(mut frame: Frame, options: BTreeMap<String, String>) -> Frame {
    frame.options.extend(options);
    frame
}

pub(crate) fn json_body(body: Result<Json<Value>, JsonRejection>) -> Result<Value, ApiError> {
    match body {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => Err(ApiError::BadRequest(rejection.body_text())),
    }
}

pub(crate) fn respond(outcome: EndpointResponse) -> Response {
    let status = StatusCode::from_u16(outcome.status).unwrap_or(StatusCode::OK);

    let mut response = match outcome.body {
        Body::Json(value) => Json(value).into_response(),
        Body::Text(text) => text.into_response(),
        Body::Empty => ().into_response(),
    };
    *response.status_mut() = status;

    let headers = response.headers_mut();
    if let Some(disposition) = outcome.disposition {
        if outcome.format == ResponseFormat::Plain && disposition.kind == "yaml" {
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static(YAML_CONTENT_TYPE),
            );
        }
        if let Ok(value) =
            HeaderValue::from_str(&format!("Attachment; filename=\"{}\"", disposition.filename))
        {
            headers.insert(header::CONTENT_DISPOSITION, value);
        }
    }
    if let Some(paths) = outcome.cache.header_value()
        && let Ok(value) = HeaderValue::from_str(&paths)
    {
        headers.insert(CACHE_INVALIDATE_HEADER, value);
    }

    response
}

#[cfg(test)]
mod tests {
    use crate::application::pipeline::{CacheInvalidation, Disposition};

    use super::*;

    fn endpoint_response(body: Body, cache: CacheInvalidation) -> EndpointResponse {
        EndpointResponse {
            status: 200,
            body,
            cache,
            format: ResponseFormat::Json,
            disposition: None,
        }
    }

    #[test]
    fn purge_all_sets_wildcard_header() {
        let response = respond(endpoint_response(
            Body::Json(serde_json::json!({"posts": []})),
            CacheInvalidation::All,
        ));
        assert_eq!(
            response
                .headers()
                .get(CACHE_INVALIDATE_HEADER)
                .and_then(|v| v.to_str().ok()),
            Some("/*")
        );
    }

    #[test]
    fn no_header_without_invalidation() {
        let response = respond(endpoint_response(Body::Empty, CacheInvalidation::None));
        assert!(response.headers().get(CACHE_INVALIDATE_HEADER).is_none());
    }

    #[test]
    fn preview_path_header() {
        let response = respond(endpoint_response(
            Body::Empty,
            CacheInvalidation::Paths(vec!["/p/abc/".to_string()]),
        ));
        assert_eq!(
            response
                .headers()
                .get(CACHE_INVALIDATE_HEADER)
                .and_then(|v| v.to_str().ok()),
            Some("/p/abc/")
        );
    }

    #[test]
    fn yaml_download_is_an_attachment() {
        let response = respond(EndpointResponse {
            status: 200,
            body: Body::Text("routes: {}\n".to_string()),
            cache: CacheInvalidation::None,
            format: ResponseFormat::Plain,
            disposition: Some(Disposition {
                kind: "yaml",
                filename: "routes.yaml",
            }),
        });
        let headers = response.headers();
        assert_eq!(
            headers
                .get(header::CONTENT_DISPOSITION)
                .and_then(|v| v.to_str().ok()),
            Some("Attachment; filename=\"routes.yaml\"")
        );
        assert_eq!(
            headers
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
            Some(YAML_CONTENT_TYPE)
        );
    }
}
