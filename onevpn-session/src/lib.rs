//! Session establishment for the 1VPN client.
//!
//! This crate handles:
//! - Host capabilities: what the embedding container can do for us
//! - Local persistence of the credential, policy acceptance and device id
//! - Hardware fingerprinting for the session's own device
//! - Bootstrapping: resolving the credential and opening the backend session
//!
//! # Credential resolution
//!
//! The host-supplied token wins; a previously persisted token is the
//! fallback. `init` is sent once per successful bootstrap; a retry after a
//! failure sends it again.

mod bootstrap;
mod error;
mod host;
mod identity;
mod store;

pub use bootstrap::SessionBootstrapper;
pub use error::{BootstrapError, BootstrapResult, SessionError, SessionResult};
pub use host::{select_host, DetachedHost, Host, StaticHost};
pub use identity::{resolve_device_fingerprint, DeviceIdentity};
pub use store::{FileStore, MemoryStore, SessionStore, StoredSession};
