//! Error types for the client core.

use crate::gate::{GateAction, GateState};
use onevpn_api::ApiError;
use onevpn_session::{BootstrapError, SessionError};
use thiserror::Error;

/// Result type for gate transitions.
pub type GateResult<T> = Result<T, GateError>;

/// Rejected gate operations. The gate state is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    /// The transition is not an edge of the gate graph.
    #[error("invalid gate transition: {from} -> {to}")]
    InvalidTransition { from: GateState, to: GateState },

    /// The user action is not offered in the current state.
    #[error("{action:?} is not available while {state}")]
    ActionUnavailable { action: GateAction, state: GateState },
}

/// Result type for orchestrator operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors surfaced by the orchestrator and its handle.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("gate error: {0}")]
    Gate(#[from] GateError),

    #[error("backend error: {0}")]
    Api(#[from] ApiError),

    #[error("bootstrap error: {0}")]
    Bootstrap(#[from] BootstrapError),

    #[error("session store error: {0}")]
    Store(#[from] SessionError),

    /// The request needs an established session.
    #[error("not available: {0}")]
    Unavailable(String),

    /// Balance does not cover the quoted price.
    #[error("insufficient balance: {required} required, {available} available")]
    InsufficientBalance { required: i64, available: i64 },

    #[error("invalid config: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The orchestrator has stopped.
    #[error("channel closed")]
    ChannelClosed,
}
