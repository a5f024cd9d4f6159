//! Core type definitions for the 1VPN client.
//!
//! This crate defines the data model shared by every other crate:
//! - Server-assigned identifiers (devices, payments, tariffs)
//! - The opaque session credential and device fingerprints
//! - The authoritative account snapshot (`ClientState`) and gate status
//! - Read-only payment history records
//!
//! Nothing here performs I/O. JSON field names follow the backend's wire
//! format so these types deserialize straight from API responses.

mod credential;
mod ids;
mod payment;
mod state;

pub use credential::{Credential, Fingerprint, Session};
pub use ids::{DeviceId, PaymentId, TariffId};
pub use payment::{Payment, PaymentStatus, TopupReceipt, MIN_TOPUP_AMOUNT};
pub use state::{
    ClientState, Device, GateStatus, GateView, HelpUrls, ServerInfo, SubscriptionAck, Tariff,
};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid identifier: {0}")]
    InvalidId(#[from] std::num::ParseIntError),
}
