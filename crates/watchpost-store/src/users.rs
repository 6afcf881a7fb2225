//! Credential store backed by a single JSON slot.
//!
//! The whole user collection lives in one file as a serialized array,
//! rewritten on every mutation. Malformed persisted data is discarded
//! with a warning instead of failing startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default file name of the persisted slot.
pub const USERS_FILE_NAME: &str = "users.json";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("username already exists: {0}")]
    DuplicateUsername(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialize: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A registered user.
///
/// The password is stored verbatim.
/// TODO: replace with salted hashing before any multi-user deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: String,
    pub password: String,
    /// Enrolled face descriptor, if the user registered one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descriptor: Option<Vec<f32>>,
}

/// File-backed user collection, unique by username.
pub struct CredentialStore {
    path: PathBuf,
    users: Vec<UserRecord>,
}

impl CredentialStore {
    /// Open the store, rehydrating from the persisted slot.
    ///
    /// A missing file starts empty; a malformed payload is logged and
    /// replaced by an empty collection rather than crashing.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let users = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<Vec<UserRecord>>(&raw) {
                Ok(list) => {
                    tracing::info!(path = %path.display(), count = list.len(), "loaded user store");
                    list
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "malformed user store, starting empty"
                    );
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "unreadable user store, starting empty");
                Vec::new()
            }
        };

        Self { path, users }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Look up a user by exact username.
    pub fn find_by_username(&self, username: &str) -> Option<&UserRecord> {
        self.users.iter().find(|u| u.username == username)
    }

    /// Insert a new user and flush immediately.
    pub fn insert(&mut self, record: UserRecord) -> Result<(), StoreError> {
        if self.find_by_username(&record.username).is_some() {
            return Err(StoreError::DuplicateUsername(record.username));
        }
        self.users.push(record);
        self.flush()
    }

    /// Rewrite the persisted slot with the current collection.
    fn flush(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let payload = serde_json::to_string(&self.users)?;
        std::fs::write(&self.path, payload)?;
        Ok(())
    }
}
