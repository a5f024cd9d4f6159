//! Classification of backend failures.
//!
//! The backend signals gate-relevant conditions through well-known `detail`
//! strings. They are matched here, once, and turned into a [`FailureKind`]
//! so nothing downstream compares strings.

use onevpn_api::ApiError;
use serde::Serialize;

const SUBSCRIBE_REQUIRED: &str = "subscribe_required";
const MAINTENANCE: &str = "maintenance";
/// `400` details the backend returns when it rejects the session credential.
const SESSION_REJECTED: [&str; 4] = [
    "initData required",
    "Invalid initData",
    "Bad initData hash",
    "Missing user",
];
const BAN_MARKERS: [&str; 2] = ["banned", "заблокирован"];

/// What a failed backend call means for the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FailureKind {
    /// The user left the required channel.
    SubscriptionRevoked,
    /// The service is down for maintenance.
    Maintenance,
    /// The account is banned.
    Banned,
    /// The backend no longer accepts the session.
    SessionInvalid,
    /// Anything else: network trouble, 5xx, unexpected bodies.
    Transient,
}

impl FailureKind {
    /// Classifies a backend error.
    #[must_use]
    pub fn classify(err: &ApiError) -> Self {
        let ApiError::Status { status, detail } = err else {
            return FailureKind::Transient;
        };
        let detail = detail.trim();

        if detail.eq_ignore_ascii_case(SUBSCRIBE_REQUIRED) {
            return FailureKind::SubscriptionRevoked;
        }
        if detail.eq_ignore_ascii_case(MAINTENANCE) {
            return FailureKind::Maintenance;
        }
        if *status == 403 {
            let lowered = detail.to_lowercase();
            if BAN_MARKERS.iter().any(|m| lowered.contains(m)) {
                return FailureKind::Banned;
            }
        }
        if *status == 401 || (*status == 400 && SESSION_REJECTED.iter().any(|d| *d == detail)) {
            return FailureKind::SessionInvalid;
        }
        FailureKind::Transient
    }

    /// Whether this failure moves the gate rather than being retried quietly.
    #[must_use]
    pub fn changes_gate(self) -> bool {
        !matches!(self, FailureKind::Transient)
    }
}
