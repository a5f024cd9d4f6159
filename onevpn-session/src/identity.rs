//! Identity of the device the client runs on.
//!
//! Derives a stable fingerprint from hardware identifiers so the same
//! machine keeps the same identity across reinstalls of the local store.

use crate::error::SessionResult;
use crate::store::SessionStore;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64, Engine};
use onevpn_types::Fingerprint;
use sha2::{Digest, Sha256};
use std::env;
use tracing::debug;

/// Hardware identifiers of the current device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub os: String,
    pub arch: String,
    pub hostname: String,
    pub machine_id: Option<String>,
}

impl DeviceIdentity {
    /// Collects identifiers for the current device.
    #[must_use]
    pub fn collect() -> Self {
        Self {
            os: env::consts::OS.to_string(),
            arch: env::consts::ARCH.to_string(),
            hostname: get_hostname(),
            machine_id: get_machine_id(),
        }
    }

    /// Human-readable label, e.g. `linux (laptop)`.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} ({})", self.os, self.hostname)
    }

    /// Fingerprint derived from these identifiers.
    ///
    /// SHA-256 over the components, first 16 bytes, base64url.
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        let mut components = vec![self.os.as_str(), self.arch.as_str(), self.hostname.as_str()];
        if let Some(id) = &self.machine_id {
            components.push(id.as_str());
        }

        let mut hasher = Sha256::new();
        hasher.update(components.join("|").as_bytes());
        let hash = hasher.finalize();

        Fingerprint::from_string(BASE64.encode(&hash[..16]))
    }
}

/// Returns the persisted device fingerprint, deriving and saving one on
/// first use.
pub fn resolve_device_fingerprint(store: &dyn SessionStore) -> SessionResult<Fingerprint> {
    if let Some(existing) = store.device_fingerprint()? {
        return Ok(existing);
    }
    let fingerprint = DeviceIdentity::collect().fingerprint();
    store.save_device_fingerprint(&fingerprint)?;
    debug!("Derived device fingerprint {}", fingerprint.short());
    Ok(fingerprint)
}

fn get_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

fn get_machine_id() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/etc/machine-id")
            .or_else(|_| std::fs::read_to_string("/var/lib/dbus/machine-id"))
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("ioreg")
            .args(["-rd1", "-c", "IOPlatformExpertDevice"])
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .and_then(|output| {
                output
                    .lines()
                    .find(|l| l.contains("IOPlatformUUID"))
                    .and_then(|l| l.split('"').nth(3))
                    .map(String::from)
            })
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        None
    }
}
