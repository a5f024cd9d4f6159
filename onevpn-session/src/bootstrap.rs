//! Session bootstrap: credential resolution and the one-time `init` call.

use crate::error::{BootstrapError, BootstrapResult};
use crate::host::Host;
use crate::identity::resolve_device_fingerprint;
use crate::store::SessionStore;
use onevpn_api::Backend;
use onevpn_types::{Credential, Session};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Resolves the session credential and opens the backend session.
pub struct SessionBootstrapper {
    host: Arc<dyn Host>,
    store: Arc<dyn SessionStore>,
    backend: Arc<dyn Backend>,
    session: Option<Session>,
    pushed: Option<Credential>,
}

impl SessionBootstrapper {
    /// Creates a bootstrapper. Nothing is sent until [`Self::bootstrap`].
    pub fn new(host: Arc<dyn Host>, store: Arc<dyn SessionStore>, backend: Arc<dyn Backend>) -> Self {
        Self {
            host,
            store,
            backend,
            session: None,
            pushed: None,
        }
    }

    /// A credential pushed through [`Self::refresh_credential`] if any, then
    /// the host token, else the persisted one.
    pub fn resolve_credential(&self) -> BootstrapResult<Credential> {
        if let Some(credential) = &self.pushed {
            return Ok(credential.clone());
        }
        if let Some(credential) = self.host.init_data().filter(|c| !c.is_empty()) {
            debug!("Using credential supplied by host {}", self.host.name());
            return Ok(credential);
        }
        match self.store.credential()? {
            Some(credential) => {
                debug!("Using persisted credential");
                Ok(credential)
            }
            None => Err(BootstrapError::MissingCredential),
        }
    }

    /// Opens the backend session, once.
    ///
    /// Returns the existing session without calling `init` again if an
    /// earlier bootstrap succeeded. After a failure the next call retries.
    pub async fn bootstrap(&mut self) -> BootstrapResult<Session> {
        if let Some(session) = &self.session {
            return Ok(session.clone());
        }

        let credential = self.resolve_credential()?;
        let device_fingerprint = resolve_device_fingerprint(self.store.as_ref())?;

        self.backend.init(&credential).await?;

        if let Err(e) = self.store.save_credential(&credential) {
            warn!("Failed to persist credential: {}", e);
        }

        let session = Session::new(credential, device_fingerprint);
        info!("Session bootstrapped for device {}", session.device_fingerprint.short());
        self.session = Some(session.clone());
        Ok(session)
    }

    /// Whether `init` has succeeded for the current session.
    pub fn is_bootstrapped(&self) -> bool {
        self.session.is_some()
    }

    /// The current session, if bootstrapped.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Forgets the session so the next [`Self::bootstrap`] calls `init` again.
    pub fn reset(&mut self) {
        if self.session.take().is_some() {
            debug!("Session reset");
        }
    }

    /// Applies a credential pushed by the host without re-running `init`.
    ///
    /// The pushed credential also wins over the host token on the next
    /// bootstrap.
    pub async fn refresh_credential(&mut self, credential: Credential) -> BootstrapResult<()> {
        self.backend.use_credential(&credential).await;
        self.pushed = Some(credential.clone());
        if let Some(session) = &mut self.session {
            session.refresh_credential(credential.clone());
        }
        self.store.save_credential(&credential)?;
        info!("Session credential refreshed");
        Ok(())
    }

    /// The persistence backing this session.
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// The backend sessions are opened against.
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// The host this session runs in.
    pub fn host(&self) -> &Arc<dyn Host> {
        &self.host
    }
}
