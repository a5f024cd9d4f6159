//! Local persistence for the session working set.
//!
//! Holds exactly three things: the last good credential, the policy
//! acceptance flag and this device's fingerprint. The policy flag only ever
//! goes from `false` to `true`; [`SessionStore::clear`] is the one way back.

use crate::error::{SessionError, SessionResult};
use onevpn_types::{Credential, Fingerprint};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

const STORE_DIR: &str = "onevpn";
const STORE_FILE: &str = "session.json";

/// Everything the client persists between loads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoredSession {
    pub credential: Option<Credential>,
    pub policy_accepted: bool,
    pub device_fingerprint: Option<Fingerprint>,
}

/// Key-value persistence for [`StoredSession`].
///
/// Implementors provide `snapshot`/`update`/`clear`; the accessors are
/// built on top and keep the policy flag monotonic.
pub trait SessionStore: Send + Sync {
    /// Returns the current stored values.
    fn snapshot(&self) -> SessionResult<StoredSession>;

    /// Applies `apply` to the stored values and persists the result.
    fn update(&self, apply: &mut dyn FnMut(&mut StoredSession)) -> SessionResult<()>;

    /// Full reset: credential, policy flag and fingerprint are all dropped.
    fn clear(&self) -> SessionResult<()>;

    /// Last persisted credential.
    fn credential(&self) -> SessionResult<Option<Credential>> {
        Ok(self.snapshot()?.credential.filter(|c| !c.is_empty()))
    }

    /// Persists a credential that the backend accepted.
    fn save_credential(&self, credential: &Credential) -> SessionResult<()> {
        self.update(&mut |s| s.credential = Some(credential.clone()))
    }

    /// Whether the privacy policy was accepted in this profile.
    fn policy_accepted(&self) -> SessionResult<bool> {
        Ok(self.snapshot()?.policy_accepted)
    }

    /// Records policy acceptance. Never unsets it.
    fn accept_policy(&self) -> SessionResult<()> {
        self.update(&mut |s| s.policy_accepted = true)
    }

    /// This device's persisted fingerprint.
    fn device_fingerprint(&self) -> SessionResult<Option<Fingerprint>> {
        Ok(self.snapshot()?.device_fingerprint)
    }

    /// Persists this device's fingerprint.
    fn save_device_fingerprint(&self, fingerprint: &Fingerprint) -> SessionResult<()> {
        self.update(&mut |s| s.device_fingerprint = Some(fingerprint.clone()))
    }
}

fn lock_err<T>(_: std::sync::PoisonError<T>) -> SessionError {
    SessionError::Storage("session store lock poisoned".to_string())
}

/// In-memory store; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<StoredSession>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-filled with `session`.
    pub fn with(session: StoredSession) -> Self {
        Self {
            inner: Mutex::new(session),
        }
    }
}

impl SessionStore for MemoryStore {
    fn snapshot(&self) -> SessionResult<StoredSession> {
        Ok(self.inner.lock().map_err(lock_err)?.clone())
    }

    fn update(&self, apply: &mut dyn FnMut(&mut StoredSession)) -> SessionResult<()> {
        let mut guard = self.inner.lock().map_err(lock_err)?;
        apply(&mut *guard);
        Ok(())
    }

    fn clear(&self) -> SessionResult<()> {
        *self.inner.lock().map_err(lock_err)? = StoredSession::default();
        Ok(())
    }
}

/// JSON file store, written atomically via a sibling temp file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    cache: Mutex<StoredSession>,
}

impl FileStore {
    /// Opens (or creates) a store at `path`.
    ///
    /// A corrupt file is logged and treated as empty rather than failing
    /// the whole load.
    pub fn open(path: impl Into<PathBuf>) -> SessionResult<Self> {
        let path = path.into();
        let cache = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("Ignoring unreadable session file {}: {}", path.display(), e);
                StoredSession::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoredSession::default(),
            Err(e) => return Err(e.into()),
        };
        debug!("Opened session store at {}", path.display());
        Ok(Self {
            path,
            cache: Mutex::new(cache),
        })
    }

    /// Opens the store in the platform data directory, or under `dir` if given.
    pub fn open_default(dir: Option<&Path>) -> SessionResult<Self> {
        let base = match dir {
            Some(dir) => dir.to_path_buf(),
            None => dirs::data_local_dir()
                .ok_or(SessionError::NoDataDir)?
                .join(STORE_DIR),
        };
        Self::open(base.join(STORE_FILE))
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, session: &StoredSession) -> SessionResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(session)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl SessionStore for FileStore {
    fn snapshot(&self) -> SessionResult<StoredSession> {
        Ok(self.cache.lock().map_err(lock_err)?.clone())
    }

    fn update(&self, apply: &mut dyn FnMut(&mut StoredSession)) -> SessionResult<()> {
        let mut cache = self.cache.lock().map_err(lock_err)?;
        let mut next = cache.clone();
        apply(&mut next);
        if next != *cache {
            self.persist(&next)?;
            *cache = next;
        }
        Ok(())
    }

    fn clear(&self) -> SessionResult<()> {
        let mut cache = self.cache.lock().map_err(lock_err)?;
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        *cache = StoredSession::default();
        Ok(())
    }
}
