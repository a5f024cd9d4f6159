//! Session credential and device fingerprints.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque session-identifying token supplied by the host container.
///
/// The backend validates it; the client only stores and forwards it.
/// `Debug` output is redacted so credentials never end up in logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    /// Wraps a raw token.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the raw token for transmission.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether the token carries no data. Empty credentials count as absent.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential(<{} bytes>)", self.0.len())
    }
}

/// Client-generated identifier that distinguishes one registered device
/// from another.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Generates a fresh random fingerprint for a new device slot.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wraps an existing fingerprint string.
    pub fn from_string(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the fingerprint as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix used when listing devices.
    #[must_use]
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(8)
            .map_or(self.0.len(), |(idx, _)| idx);
        &self.0[..end]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The per-load session: who we are and which device we run on.
///
/// Immutable for the session's lifetime except for a credential refresh
/// pushed by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub credential: Credential,
    pub device_fingerprint: Fingerprint,
}

impl Session {
    /// Creates a session.
    pub fn new(credential: Credential, device_fingerprint: Fingerprint) -> Self {
        Self {
            credential,
            device_fingerprint,
        }
    }

    /// Replaces the credential after a host-side update.
    pub fn refresh_credential(&mut self, credential: Credential) {
        self.credential = credential;
    }
}
