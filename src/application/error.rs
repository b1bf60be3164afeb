use std::error::Error as StdError;

use axum::{http::StatusCode, response::Response};
use thiserror::Error;

use crate::{
    application::repos::RepoError, domain::error::DomainError, infra::error::InfraError,
};

#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// Failures surfaced by endpoint controllers. Each variant maps to one
/// HTTP error class at the transport edge.
#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{message}")]
    Validation {
        message: String,
        context: Option<String>,
    },
    #[error("{0}")]
    NoPermission(String),
    #[error("{0}")]
    UpdateCollision(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("{0}")]
    Internal(String),
}

impl EndpointError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            context: None,
        }
    }

    pub fn validation_with(message: impl Into<String>, context: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            context: Some(context.into()),
        }
    }

    pub fn no_permission(message: impl Into<String>) -> Self {
        Self::NoPermission(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Ghost-compatible error type name used in response bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NotFoundError",
            Self::BadRequest(_) => "BadRequestError",
            Self::Validation { .. } => "ValidationError",
            Self::NoPermission(_) => "NoPermissionError",
            Self::UpdateCollision(_) => "UpdateCollisionError",
            Self::Repo(RepoError::Timeout) => "ServiceUnavailableError",
            Self::Repo(_) | Self::Internal(_) => "InternalServerError",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NoPermission(_) => StatusCode::FORBIDDEN,
            Self::UpdateCollision(_) => StatusCode::CONFLICT,
            Self::Repo(RepoError::Timeout) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Repo(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DomainError> for EndpointError {
    fn from(error: DomainError) -> Self {
        match error {
            DomainError::Validation { message } => Self::validation(message),
        }
    }
}

/// Bootstrap and process-level failures.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_errors_map_to_http_classes() {
        assert_eq!(
            EndpointError::not_found("Post not found.").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            EndpointError::validation("bad").status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            EndpointError::UpdateCollision("stale".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            EndpointError::Repo(RepoError::Timeout).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn domain_rejections_become_validation_errors() {
        let err = EndpointError::from(DomainError::validation("Unknown filter field `colour`"));
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.to_string(), "Unknown filter field `colour`");
    }

    #[test]
    fn error_report_collects_source_chain() {
        let err = AppError::Repo(RepoError::from_persistence("connection reset"));
        let report = ErrorReport::from_error("test", StatusCode::SERVICE_UNAVAILABLE, &err);
        assert_eq!(report.messages[0], "persistence error: connection reset");
    }
}
