//! Client configuration.

use crate::error::{SyncError, SyncResult};
use onevpn_api::ApiConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for the client orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Interval between state fetches, in milliseconds.
    pub poll_interval_ms: u64,
    /// Devices at the head of the list that reconciliation never removes.
    pub protected_devices: usize,
    /// Prefix turning a channel handle into a link.
    pub channel_base_url: String,
    /// Support contact used until the backend reports one.
    pub support_url: String,
    /// Payment provider passed to top-ups.
    pub payment_provider: String,
    /// Backend connection settings.
    pub api: ApiConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10_000,
            protected_devices: 1,
            channel_base_url: "https://t.me/".to_string(),
            support_url: "https://t.me/support".to_string(),
            payment_provider: "yookassa".to_string(),
            api: ApiConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Loads a JSON config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> SyncResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the orchestrator cannot run with.
    pub fn validate(&self) -> SyncResult<()> {
        if self.poll_interval_ms == 0 {
            return Err(SyncError::Config("poll_interval_ms must be positive".into()));
        }
        if self.api.base_url.trim().is_empty() {
            return Err(SyncError::Config("api.base_url is empty".into()));
        }
        Ok(())
    }

    /// Poll interval as a duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Link for a channel given as `@name`, `name` or a full URL.
    pub fn channel_link(&self, channel: &str) -> String {
        let channel = channel.trim();
        if channel.starts_with("http://") || channel.starts_with("https://") {
            return channel.to_string();
        }
        format!("{}{}", self.channel_base_url, channel.trim_start_matches('@'))
    }
}
