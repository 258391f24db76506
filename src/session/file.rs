//! JSON file repository for session state.
//!
//! Headless fallback for machines without a usable keychain. The whole map is
//! rewritten on every mutation; a missing file reads as an empty session.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::repository::{SessionRepository, StorageError};

/// Default session file location: `<config dir>/interntrack/session.json`.
pub fn default_session_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("interntrack").join("session.json"))
}

#[derive(Debug)]
pub struct FileRepository {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match fs::read(&self.path) {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn store(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(entries)?;
        // Write-then-rename so a crash never leaves a truncated file behind.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl SessionRepository for FileRepository {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().map_err(|_| StorageError::Poisoned)?;
        let mut entries = self.load()?;
        entries.insert(key.to_string(), value.to_string());
        self.store(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().map_err(|_| StorageError::Poisoned)?;
        let mut entries = self.load()?;
        if entries.remove(key).is_none() {
            return Ok(());
        }
        self.store(&entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileRepository::new(dir.path().join("session.json"));
        assert_eq!(repo.get("access").unwrap(), None);
        assert!(repo.remove("access").is_ok());
        assert!(!repo.path().exists());
    }

    #[test]
    fn test_values_persist_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let repo = FileRepository::new(&path);
        repo.set("access", "a1").unwrap();
        repo.set("refresh", "r1").unwrap();

        let reopened = FileRepository::new(&path);
        assert_eq!(reopened.get("access").unwrap().as_deref(), Some("a1"));
        assert_eq!(reopened.get("refresh").unwrap().as_deref(), Some("r1"));

        reopened.remove("access").unwrap();
        assert_eq!(repo.get("access").unwrap(), None);
        assert_eq!(repo.get("refresh").unwrap().as_deref(), Some("r1"));
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, b"{not json").unwrap();

        let repo = FileRepository::new(&path);
        assert!(matches!(repo.get("access"), Err(StorageError::Corrupt(_))));
    }
}
