//! Error types for session handling.

use onevpn_api::ApiError;
use thiserror::Error;

/// Local persistence errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Reading or writing the store failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// No usable data directory on this platform.
    #[error("no data directory available")]
    NoDataDir,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for store operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors that can end a bootstrap attempt.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Neither the host nor the store had a credential.
    #[error("no session credential available")]
    MissingCredential,

    /// The backend rejected or never answered `init`.
    #[error("backend error: {0}")]
    Backend(#[from] ApiError),

    /// Local persistence failed.
    #[error("session store error: {0}")]
    Store(#[from] SessionError),
}

/// Result type for bootstrap operations.
pub type BootstrapResult<T> = Result<T, BootstrapError>;
