//! Machine identity used to authenticate control-plane calls.
//!
//! The credential is created once by [`bootstrap::IdentityBootstrapper`] and
//! cached in a single JSON file; once persisted it is never rewritten.

pub mod bootstrap;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use bootstrap::{BootstrapError, IdentityBootstrapper};

/// Service-account credential for the remote control plane.
///
/// `id` is derived deterministically from the host's stable identity, so a
/// host that loses the cached file still produces the same logical identity
/// on the next bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAccountCredential {
    pub id: String,
    pub email: String,
    pub login: String,
    pub password: String,
}

/// Errors from identity persistence.
#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("identity file {path} exists but cannot be parsed: {reason}")]
    CorruptState { path: PathBuf, reason: String },

    #[error("cannot read identity file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot write identity file {path}: {source}")]
    PersistenceFailed {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// File-backed store for the service-account credential.
///
/// Source of truth once a credential exists: `load` returning `Some` means
/// bootstrap must not touch the remote at all.
pub struct IdentityStore {
    path: PathBuf,
}

impl IdentityStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the cached credential, or `None` if no file exists yet.
    ///
    /// A file that exists but does not parse is `CorruptState`, which is
    /// fatal at startup: proceeding would re-provision a live identity.
    pub fn load(&self) -> Result<Option<ServiceAccountCredential>, IdentityError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(IdentityError::ReadFailed {
                    path: self.path.clone(),
                    source: e,
                });
            }
        };

        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| IdentityError::CorruptState {
                path: self.path.clone(),
                reason: e.to_string(),
            })
    }

    /// Persist the credential. Called exactly once, at first bootstrap.
    pub fn save(&self, credential: &ServiceAccountCredential) -> Result<(), IdentityError> {
        let persist = |e| IdentityError::PersistenceFailed {
            path: self.path.clone(),
            source: e,
        };

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(persist)?;
        }

        let json = serde_json::to_string_pretty(credential)
            .expect("credential serializes to JSON");
        std::fs::write(&self.path, json).map_err(persist)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential() -> ServiceAccountCredential {
        ServiceAccountCredential {
            id: "provwatch-ab12cd".to_string(),
            email: "provwatch-ab12cd@node-1".to_string(),
            login: "provwatch-ab12cd".to_string(),
            password: "s3cret".to_string(),
        }
    }

    #[test]
    fn load_returns_none_when_file_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::new(dir.path().join("identity.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::new(dir.path().join("identity.json"));

        store.save(&credential()).unwrap();
        assert_eq!(store.load().unwrap(), Some(credential()));
    }

    #[test]
    fn save_creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::new(dir.path().join("state/nested/identity.json"));

        store.save(&credential()).unwrap();
        assert!(store.load().unwrap().is_some());
    }

    #[test]
    fn unparseable_file_is_corrupt_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");
        std::fs::write(&path, "not json {").unwrap();

        let store = IdentityStore::new(path);
        assert!(matches!(
            store.load(),
            Err(IdentityError::CorruptState { .. })
        ));
    }
}
