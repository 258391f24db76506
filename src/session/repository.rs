//! Persistence seam for session state.
//!
//! A `SessionRepository` is a flat string key/value store. `TokenStore` is the
//! only component that talks to it; everything else goes through the store.

use std::collections::HashMap;
use std::sync::Mutex;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Keychain operation failed: {0}")]
    Keychain(String),

    #[error("Session file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session data is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Session storage lock poisoned")]
    Poisoned,
}

/// Key/value persistence for credentials and the cached identity.
///
/// Implementations must treat `remove` of a missing key as success.
/// Writes are last-write-wins; there is no cross-key transaction.
pub trait SessionRepository: Send + Sync {
    /// Read a value. `Ok(None)` when the key has never been written or was removed.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete a value. Idempotent.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Process-local repository. Used by tests and by `--storage memory`.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionRepository for MemoryRepository {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }
}
