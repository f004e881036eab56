//! Session context: the persisted bearer credential plus the global
//! "session expired" signal.
//!
//! A [`Session`] is passed explicitly to the request client; nothing here is
//! global. Expiry is idempotent: the first caller clears the store and
//! notifies subscribers, later callers are no-ops. An expiry reported for a
//! token that has since been replaced by a new login is ignored.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Bearer token and identity record returned by the login endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCredential {
    pub token: String,
    #[serde(default)]
    pub user: Value,
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("credential file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Storage backend for the credential.
///
/// `clear` on an empty store must succeed.
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Result<Option<StoredCredential>, CredentialError>;
    fn save(&self, credential: &StoredCredential) -> Result<(), CredentialError>;
    fn clear(&self) -> Result<(), CredentialError>;
}

/// Process-local store, used by tests and embedders that persist elsewhere.
#[derive(Default)]
pub struct MemoryCredentialStore {
    inner: Mutex<Option<StoredCredential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(credential: StoredCredential) -> Self {
        Self {
            inner: Mutex::new(Some(credential)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<StoredCredential>, CredentialError> {
        Ok(self.inner.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn save(&self, credential: &StoredCredential) -> Result<(), CredentialError> {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = Some(credential.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), CredentialError> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).take();
        Ok(())
    }
}

/// JSON file store. The file is removed on `clear`.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> CredentialError {
        CredentialError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<StoredCredential>, CredentialError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_err(e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| CredentialError::Corrupt {
                path: self.path.clone(),
                source,
            })
    }

    fn save(&self, credential: &StoredCredential) -> Result<(), CredentialError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }
        let bytes = serde_json::to_vec_pretty(credential).map_err(|source| CredentialError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        std::fs::write(&self.path, bytes).map_err(|e| self.io_err(e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .map_err(|e| self.io_err(e))?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), CredentialError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_err(e)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    /// The server rejected the token as expired; the UI should navigate to
    /// the login screen.
    Expired,
}

/// Shared session context injected into the request client.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    store: Box<dyn CredentialStore>,
    status: watch::Sender<SessionStatus>,
    /// Serializes login against expiry so a check-then-clear cannot wipe a
    /// credential saved in between.
    transition: Mutex<()>,
}

impl Session {
    pub fn new(store: impl CredentialStore + 'static) -> Self {
        let (status, _) = watch::channel(SessionStatus::Active);
        Self {
            inner: Arc::new(SessionInner {
                store: Box::new(store),
                status,
                transition: Mutex::new(()),
            }),
        }
    }

    /// Session backed by an empty in-memory store.
    pub fn in_memory() -> Self {
        Self::new(MemoryCredentialStore::new())
    }

    /// Current bearer token. Read on every outbound attempt.
    pub fn token(&self) -> Option<String> {
        match self.inner.store.load() {
            Ok(credential) => credential.map(|c| c.token),
            Err(e) => {
                warn!("credential store unreadable: {e}");
                None
            }
        }
    }

    pub fn credential(&self) -> Result<Option<StoredCredential>, CredentialError> {
        self.inner.store.load()
    }

    /// Persists a fresh credential and re-arms the session.
    pub fn login(&self, credential: StoredCredential) -> Result<(), CredentialError> {
        let _guard = self.lock_transition();
        self.inner.store.save(&credential)?;
        self.inner.status.send_replace(SessionStatus::Active);
        Ok(())
    }

    /// Explicit logout. Does not raise the expired signal.
    pub fn logout(&self) -> Result<(), CredentialError> {
        self.inner.store.clear()
    }

    /// Clears the credential and signals expiry after the server rejected
    /// `sent`, the bearer the failing request carried.
    ///
    /// Returns true only for the call that performed the transition; every
    /// concurrent or later caller observes a no-op until the next `login`.
    /// If the store now holds a different token, the rejection belongs to a
    /// superseded session and nothing changes.
    pub fn expire_for(&self, sent: Option<&str>) -> bool {
        let _guard = self.lock_transition();
        let current = self.token();
        if current.is_some() && current.as_deref() != sent {
            debug!("expiry reported for a replaced token; ignored");
            return false;
        }
        let first = self.inner.status.send_if_modified(|status| {
            if *status == SessionStatus::Expired {
                return false;
            }
            *status = SessionStatus::Expired;
            true
        });
        if first {
            if let Err(e) = self.inner.store.clear() {
                warn!("failed to clear expired credential: {e}");
            }
            info!("session expired; credential cleared");
        }
        first
    }

    fn lock_transition(&self) -> std::sync::MutexGuard<'_, ()> {
        self.inner
            .transition
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> SessionStatus {
        *self.inner.status.borrow()
    }

    /// Receiver notified when the session expires.
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.inner.status.subscribe()
    }
}
