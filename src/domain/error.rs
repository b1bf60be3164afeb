use thiserror::Error;

/// Rejections raised while parsing caller-supplied documents and queries
/// (post filters, order clauses, routes files).
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("{message}")]
    Validation { message: String },
}

impl DomainError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}
