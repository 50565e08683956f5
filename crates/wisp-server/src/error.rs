//! HTTP-facing error type

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use wisp_core::StoreError;

/// Errors returned by request handlers
///
/// Each variant maps to one status code; the body is the plain-text message.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or wrong upload password
    #[error("Unauthorized: Invalid or missing password")]
    Unauthorized,

    /// Cross-origin WebSocket attempt
    #[error("Forbidden origin")]
    Forbidden,

    /// Unknown, consumed, or expired transfer
    #[error("File not found")]
    NotFound,

    /// Upload exceeds the configured limit
    #[error("File too large (max: {max_mb} MB)")]
    PayloadTooLarge {
        /// Configured limit in MiB
        max_mb: u64,
    },

    /// Malformed upload
    #[error("{0}")]
    BadRequest(String),

    /// Server-side failure; details are logged, not returned
    #[error("Internal server error")]
    Internal(String),
}

impl ApiError {
    /// Status code for this error
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => Self::NotFound,
            StoreError::EntropyUnavailable(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(detail) = &self {
            tracing::error!("Request failed: {}", detail);
        }
        (self.status(), self.to_string()).into_response()
    }
}
