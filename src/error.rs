//! Error taxonomy for the retrieval path.
//!
//! Every failure on the query path is one of four kinds. Only
//! [`RetrievalError::Validation`] is the caller's fault; the HTTP layer maps
//! it to `400` and everything else to `500`, exposing just the message.

use thiserror::Error;

/// Errors produced by the embedding generator, the similarity query service,
/// and the request handlers.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Bad or missing request fields. User-correctable.
    #[error("{0}")]
    Validation(String),

    /// Model load or inference failure.
    #[error("embedding extraction failed: {0}")]
    Extraction(String),

    /// The referenced project does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Storage failures, dimensionality mismatches, anything else.
    #[error("{0}")]
    Internal(String),
}

impl RetrievalError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn extraction(message: impl Into<String>) -> Self {
        Self::Extraction(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn project_not_found(project_id: i64) -> Self {
        Self::NotFound(format!("project not found: {}", project_id))
    }

    /// True for errors the caller can fix by changing the request.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<sqlx::Error> for RetrievalError {
    fn from(err: sqlx::Error) -> Self {
        Self::Internal(format!("storage error: {}", err))
    }
}

impl From<std::io::Error> for RetrievalError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(format!("I/O error: {}", err))
    }
}

impl From<tokio::task::JoinError> for RetrievalError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(format!("background task failed: {}", err))
    }
}

/// Result alias for the retrieval path.
pub type Result<T> = std::result::Result<T, RetrievalError>;
