//! OS keychain repository for session state.
//!
//! Uses the `keyring` crate (macOS Keychain, Windows Credential Manager, and
//! the kernel keyutils session keyring on Linux). Each session key is stored
//! as its own credential entry under a shared service name, so tokens never
//! touch disk in plaintext.
//!
//! Keyutils entries do not survive a reboot, which is why Linux defaults to
//! the file backend (see `StorageBackend::platform_default`).

use keyring::Entry;

use super::repository::{SessionRepository, StorageError};

/// Default keychain service name.
pub const DEFAULT_SERVICE_NAME: &str = "com.interntrack.client";

impl From<keyring::Error> for StorageError {
    fn from(err: keyring::Error) -> Self {
        StorageError::Keychain(err.to_string())
    }
}

/// Session repository backed by the platform credential store.
#[derive(Debug, Clone)]
pub struct KeychainRepository {
    service: String,
}

impl KeychainRepository {
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry, StorageError> {
        Ok(Entry::new(&self.service, key)?)
    }
}

impl Default for KeychainRepository {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE_NAME)
    }
}

impl SessionRepository for KeychainRepository {
    /// Returns `None` if no entry exists (never logged in, or logged out).
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(StorageError::from(e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entry(key)?.set_password(value)?;
        Ok(())
    }

    /// Idempotent: ignores `NoEntry` (already deleted or never stored).
    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(StorageError::from(e)),
        }
    }
}
