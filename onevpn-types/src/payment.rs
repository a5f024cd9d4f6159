//! Payment history and top-up records.

use crate::ids::PaymentId;
use crate::state::deserialize_timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Smallest top-up the backend accepts, in whole currency units.
pub const MIN_TOPUP_AMOUNT: i64 = 50;

/// Lifecycle state of a payment as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Canceled,
    /// Any status string this client does not know about, kept verbatim.
    Other(String),
}

impl PaymentStatus {
    /// Whether the payment reached a final state.
    #[must_use]
    pub fn is_final(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

impl From<String> for PaymentStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "pending" => PaymentStatus::Pending,
            "succeeded" => PaymentStatus::Succeeded,
            "canceled" => PaymentStatus::Canceled,
            _ => PaymentStatus::Other(raw),
        }
    }
}

impl From<PaymentStatus> for String {
    fn from(status: PaymentStatus) -> Self {
        status.to_string()
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentStatus::Pending => f.write_str("pending"),
            PaymentStatus::Succeeded => f.write_str("succeeded"),
            PaymentStatus::Canceled => f.write_str("canceled"),
            PaymentStatus::Other(raw) => f.write_str(raw),
        }
    }
}

/// Read-only payment history record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub amount: i64,
    #[serde(default)]
    pub provider: String,
    pub status: PaymentStatus,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Result of creating a top-up: where to send the user to pay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopupReceipt {
    pub confirmation_url: String,
    #[serde(default)]
    pub payment_id: Option<PaymentId>,
}
