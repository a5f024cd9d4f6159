//! Host container capabilities.
//!
//! The client may run inside a mini-app container that supplies the
//! credential and can open links or show popups, or it may run detached.
//! Call sites always talk to a [`Host`]; the choice between a real host and
//! the no-op fallback is made once, by [`select_host`].

use onevpn_types::Credential;
use std::sync::Arc;
use tracing::{debug, info};

/// What the embedding container can do for the client.
///
/// Every method has a no-op default so a host implements only what it
/// actually supports.
pub trait Host: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Token the container hands to the client, if any.
    fn init_data(&self) -> Option<Credential> {
        None
    }

    /// Tells the container the client finished loading.
    fn ready(&self) {}

    /// Opens an external link (channel, policy, support, payment).
    fn open_link(&self, url: &str) {
        debug!("{}: open_link unsupported, dropping {}", self.name(), url);
    }

    /// Shows a short modal message.
    fn show_popup(&self, message: &str) {
        debug!("{}: show_popup unsupported, dropping {:?}", self.name(), message);
    }
}

/// Fallback used when no container is present.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedHost;

impl Host for DetachedHost {
    fn name(&self) -> &'static str {
        "detached"
    }
}

/// Host for headless runs: a fixed token and links written to the log.
#[derive(Debug, Clone, Default)]
pub struct StaticHost {
    init_data: Option<Credential>,
}

impl StaticHost {
    /// Creates a host that supplies `init_data` (blank tokens count as none).
    pub fn new(init_data: Option<Credential>) -> Self {
        Self {
            init_data: init_data.filter(|c| !c.is_empty()),
        }
    }
}

impl Host for StaticHost {
    fn name(&self) -> &'static str {
        "static"
    }

    fn init_data(&self) -> Option<Credential> {
        self.init_data.clone()
    }

    fn ready(&self) {
        debug!("static host ready");
    }

    fn open_link(&self, url: &str) {
        info!("Open: {}", url);
    }

    fn show_popup(&self, message: &str) {
        info!("Popup: {}", message);
    }
}

/// Picks the host once at startup, falling back to [`DetachedHost`].
pub fn select_host(host: Option<Arc<dyn Host>>) -> Arc<dyn Host> {
    match host {
        Some(host) => {
            debug!("Using host container: {}", host.name());
            host
        }
        None => {
            debug!("No host container, running detached");
            Arc::new(DetachedHost)
        }
    }
}
