use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::error::{EndpointError, ErrorReport};
use crate::infra::uploads::UploadStagingError;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub errors: Vec<ApiErrorMessage>,
}

#[derive(Debug, Serialize)]
pub struct ApiErrorMessage {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub message: String,
    pub context: Option<String>,
}

/// Transport-level failure. Endpoint errors pass through with their own
/// type and status; the rest originate in the HTTP layer.
#[derive(Debug)]
pub enum ApiError {
    Endpoint(EndpointError),
    Unauthorized(&'static str),
    BadRequest(String),
    Upload(UploadStagingError),
    RateLimited { retry_after: u64 },
}

impl ApiError {
    pub fn unauthorized() -> Self {
        Self::Unauthorized("Authorization failed")
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Endpoint(err) => err.status_code(),
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Upload(UploadStagingError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Upload(UploadStagingError::Io(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Upload(UploadStagingError::Stream(err)) => err.status(),
            Self::Upload(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    fn message(&self) -> ApiErrorMessage {
        match self {
            Self::Endpoint(err) => ApiErrorMessage {
                kind: err.kind(),
                message: match err {
                    EndpointError::Repo(_) => "An unexpected error occurred.".to_string(),
                    other => other.to_string(),
                },
                context: match err {
                    EndpointError::Validation { context, .. } => context.clone(),
                    _ => None,
                },
            },
            Self::Unauthorized(message) => ApiErrorMessage {
                kind: "UnauthorizedError",
                message: (*message).to_string(),
                context: None,
            },
            Self::BadRequest(message) => ApiErrorMessage {
                kind: "BadRequestError",
                message: message.clone(),
                context: None,
            },
            Self::Upload(err) => ApiErrorMessage {
                kind: match err {
                    UploadStagingError::TooLarge { .. } => "RequestEntityTooLargeError",
                    UploadStagingError::Stream(stream)
                        if stream.status() == StatusCode::PAYLOAD_TOO_LARGE =>
                    {
                        "RequestEntityTooLargeError"
                    }
                    UploadStagingError::Io(_) => "InternalServerError",
                    _ => "BadRequestError",
                },
                message: err.to_string(),
                context: None,
            },
            Self::RateLimited { retry_after } => ApiErrorMessage {
                kind: "TooManyRequestsError",
                message: "Too many requests.".to_string(),
                context: Some(format!("Retry after {retry_after} seconds")),
            },
        }
    }

    fn report(&self, status: StatusCode) -> ErrorReport {
        match self {
            Self::Endpoint(err) => ErrorReport::from_error("infra::http::api::endpoint", status, err),
            Self::Upload(err) => ErrorReport::from_error("infra::http::api::upload", status, err),
            Self::Unauthorized(message) => {
                ErrorReport::from_message("infra::http::api::auth", status, *message)
            }
            Self::BadRequest(message) => {
                ErrorReport::from_message("infra::http::api", status, message.clone())
            }
            Self::RateLimited { retry_after } => ErrorReport::from_message(
                "infra::http::api::rate_limit",
                status,
                format!("rate_limited: retry_after={retry_after}"),
            ),
        }
    }
}

impl From<EndpointError> for ApiError {
    fn from(err: EndpointError) -> Self {
        Self::Endpoint(err)
    }
}

impl From<UploadStagingError> for ApiError {
    fn from(err: UploadStagingError) -> Self {
        Self::Upload(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ApiErrorBody {
            errors: vec![self.message()],
        };
        let mut response = (status, Json(body)).into_response();
        if let Self::RateLimited { retry_after } = &self
            && let Ok(value) = HeaderValue::from_str(&retry_after.to_string())
        {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        // Logging middleware picks this up for structured diagnostics.
        self.report(status).attach(&mut response);
        response
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;
    use serde_json::Value;

    use super::*;

    async fn body_json(response: Response) -> Value {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn validation_errors_carry_context() {
        let response =
            ApiError::from(EndpointError::validation_with("bad option", "include")).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(response.extensions().get::<ErrorReport>().is_some());
        let body = body_json(response).await;
        assert_eq!(body["errors"][0]["type"], "ValidationError");
        assert_eq!(body["errors"][0]["message"], "bad option");
        assert_eq!(body["errors"][0]["context"], "include");
    }

    #[tokio::test]
    async fn rate_limited_sets_retry_after() {
        let response = ApiError::RateLimited { retry_after: 60 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok()),
            Some("60")
        );
    }

    #[tokio::test]
    async fn repository_details_are_not_leaked() {
        let err = EndpointError::Repo(crate::application::repos::RepoError::from_persistence(
            "relation \"posts\" does not exist",
        ));
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["errors"][0]["type"], "InternalServerError");
        assert_eq!(body["errors"][0]["message"], "An unexpected error occurred.");
    }
}
