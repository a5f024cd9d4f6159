//! API error types.

use thiserror::Error;

/// Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors produced by the transport layer.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The backend answered with a non-success status.
    #[error("request failed ({status}): {detail}")]
    Status { status: u16, detail: String },

    /// The request never produced a response.
    #[error("network error: {0}")]
    Network(String),

    /// A success response carried a body we could not decode.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// The request was rejected locally before being sent.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ApiError {
    /// Builds a status error.
    pub fn status(status: u16, detail: impl Into<String>) -> Self {
        ApiError::Status {
            status,
            detail: detail.into(),
        }
    }

    /// Human-readable message suitable for a one-line notice.
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            ApiError::Status { detail, .. } => detail.clone(),
            other => other.to_string(),
        }
    }

    /// HTTP status code, when the backend answered at all.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns true if the backend could not be reached.
    #[must_use]
    pub fn is_network(&self) -> bool {
        matches!(self, ApiError::Network(_))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}
