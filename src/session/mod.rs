//! Session persistence: credentials and the cached identity.
//!
//! `TokenStore` is the single owner of persisted session state. Requests,
//! refreshes, guards and login all read and write through it, never through
//! a repository directly.

pub mod claims;
pub mod file;
pub mod keychain;
pub mod repository;

pub use claims::{decode_claims, AccessClaims};
pub use file::FileRepository;
pub use keychain::KeychainRepository;
pub use repository::{MemoryRepository, SessionRepository, StorageError};

use std::fmt;
use std::sync::Arc;

use crate::api::types::Identity;

/// Storage key for the access credential.
pub const ACCESS_KEY: &str = "access";
/// Storage key for the refresh credential.
pub const REFRESH_KEY: &str = "refresh";
/// Storage key for the JSON-serialized identity.
pub const USER_KEY: &str = "user";

/// Strip transport artifacts from a stored token.
///
/// Removes one leading case-insensitive `Bearer ` prefix, surrounding
/// whitespace, and one layer of matching `"` or `'` quotes.
pub fn normalize_token(raw: &str) -> String {
    let mut token = strip_bearer(raw.trim()).trim();

    for quote in ['"', '\''] {
        if token.len() >= 2 && token.starts_with(quote) && token.ends_with(quote) {
            token = token[1..token.len() - 1].trim();
            break;
        }
    }

    token.to_string()
}

fn strip_bearer(raw: &str) -> &str {
    match raw.get(..6) {
        Some(prefix) if prefix.eq_ignore_ascii_case("bearer") => {
            let rest = &raw[6..];
            let trimmed = rest.trim_start();
            // Prefix must be followed by whitespace.
            if trimmed.len() < rest.len() {
                trimmed
            } else {
                raw
            }
        }
        _ => raw,
    }
}

/// Partial session write. Omitted (or empty) fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct SessionUpdate {
    pub access: Option<String>,
    pub refresh: Option<String>,
    pub identity: Option<Identity>,
}

impl SessionUpdate {
    pub fn access(token: impl Into<String>) -> Self {
        Self {
            access: Some(token.into()),
            ..Self::default()
        }
    }

    pub fn with_refresh(mut self, token: impl Into<String>) -> Self {
        self.refresh = Some(token.into());
        self
    }

    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }
}

/// Read/write access to persisted credentials and identity.
///
/// Cheap to clone; clones share the same repository.
#[derive(Clone)]
pub struct TokenStore {
    repo: Arc<dyn SessionRepository>,
}

impl fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenStore").finish_non_exhaustive()
    }
}

impl TokenStore {
    pub fn new(repo: Arc<dyn SessionRepository>) -> Self {
        Self { repo }
    }

    /// Store backed by a fresh `MemoryRepository`.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryRepository::new()))
    }

    /// Normalized access credential, or `""` if absent.
    pub fn get_access(&self) -> String {
        self.read_token(ACCESS_KEY)
    }

    /// Normalized refresh credential, or `""` if absent.
    pub fn get_refresh(&self) -> String {
        self.read_token(REFRESH_KEY)
    }

    /// Cached identity. A missing or malformed `user` entry reads as `None`.
    pub fn get_identity(&self) -> Option<Identity> {
        let raw = self.read_raw(USER_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(identity) => Some(identity),
            Err(e) => {
                log::debug!("Ignoring unparseable cached identity: {}", e);
                None
            }
        }
    }

    /// Whether a usable access credential is stored.
    pub fn has_credentials(&self) -> bool {
        !self.get_access().is_empty()
    }

    /// Decode the stored access token's claims, if it is a well-formed JWT.
    pub fn access_claims(&self) -> Option<AccessClaims> {
        let access = self.get_access();
        if access.is_empty() {
            return None;
        }
        decode_claims(&access).ok()
    }

    /// Write the supplied fields; nothing is cleared by omission.
    ///
    /// All-or-nothing: if any write fails, keys already written by this call
    /// are put back to their previous values before the error is returned.
    pub fn set_session(&self, update: SessionUpdate) -> Result<(), StorageError> {
        let mut writes = Vec::with_capacity(3);
        if let Some(access) = update.access.filter(|t| !t.is_empty()) {
            writes.push((ACCESS_KEY, access));
        }
        if let Some(refresh) = update.refresh.filter(|t| !t.is_empty()) {
            writes.push((REFRESH_KEY, refresh));
        }
        if let Some(identity) = update.identity {
            writes.push((USER_KEY, serde_json::to_string(&identity)?));
        }

        let previous = writes
            .iter()
            .map(|(key, _)| self.repo.get(key))
            .collect::<Result<Vec<_>, _>>()?;

        for (done, (key, value)) in writes.iter().enumerate() {
            if let Err(e) = self.repo.set(key, value) {
                log::warn!("Failed to write session key {}: {}", key, e);
                self.restore(writes[..done].iter().map(|(k, _)| *k).zip(&previous));
                return Err(e);
            }
        }
        Ok(())
    }

    /// Remove credentials and identity. Succeeds when already empty.
    ///
    /// Every key is attempted even if an earlier removal fails; the first
    /// error is returned.
    pub fn clear_session(&self) -> Result<(), StorageError> {
        let mut first_err = None;
        for key in [ACCESS_KEY, REFRESH_KEY, USER_KEY] {
            if let Err(e) = self.repo.remove(key) {
                log::warn!("Failed to remove session key {}: {}", key, e);
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn restore<'a>(&self, keys: impl Iterator<Item = (&'a str, &'a Option<String>)>) {
        for (key, value) in keys {
            let result = match value {
                Some(value) => self.repo.set(key, value),
                None => self.repo.remove(key),
            };
            if let Err(e) = result {
                log::error!("Failed to restore session key {}: {}", key, e);
            }
        }
    }

    fn read_token(&self, key: &str) -> String {
        self.read_raw(key)
            .map(|raw| normalize_token(&raw))
            .unwrap_or_default()
    }

    fn read_raw(&self, key: &str) -> Option<String> {
        match self.repo.get(key) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("Failed to read session key {}: {}", key, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::Role;
    use proptest::prelude::*;

    fn identity(role: Role) -> Identity {
        Identity {
            id: Some(serde_json::json!(7)),
            role,
            full_name: Some("Ada Intern".to_string()),
            name: None,
            email: Some("ada@example.com".to_string()),
            extra: Default::default(),
        }
    }

    #[test]
    fn test_normalize_strips_artifacts() {
        assert_eq!(normalize_token("abc.def.ghi"), "abc.def.ghi");
        assert_eq!(normalize_token("Bearer abc"), "abc");
        assert_eq!(normalize_token("bearer   abc"), "abc");
        assert_eq!(normalize_token("BEARER\tabc"), "abc");
        assert_eq!(normalize_token("  abc  "), "abc");
        assert_eq!(normalize_token("\"abc\""), "abc");
        assert_eq!(normalize_token("'abc'"), "abc");
        assert_eq!(normalize_token("Bearer \" abc \""), "abc");
        assert_eq!(normalize_token(""), "");
    }

    #[test]
    fn test_normalize_strips_one_layer_only() {
        assert_eq!(normalize_token("\"\"abc\"\""), "\"abc\"");
        assert_eq!(normalize_token("Bearer Bearer abc"), "Bearer abc");
    }

    #[test]
    fn test_normalize_leaves_lookalikes() {
        // Mismatched quotes and a prefix without whitespace are token content.
        assert_eq!(normalize_token("\"abc'"), "\"abc'");
        assert_eq!(normalize_token("Bearerabc"), "Bearerabc");
        assert_eq!(normalize_token("\""), "\"");
        assert_eq!(normalize_token("Bearer"), "Bearer");
    }

    #[test]
    fn test_partial_update_keeps_other_fields() {
        let store = TokenStore::in_memory();
        store
            .set_session(SessionUpdate::access("a0").with_refresh("r0"))
            .unwrap();

        store.set_session(SessionUpdate::access("a")).unwrap();

        assert_eq!(store.get_access(), "a");
        assert_eq!(store.get_refresh(), "r0");
    }

    /// Rejects writes to one key; everything else goes to memory.
    struct RejectingRepository {
        inner: MemoryRepository,
        reject: &'static str,
    }

    impl SessionRepository for RejectingRepository {
        fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            if key == self.reject {
                return Err(StorageError::Keychain(format!("{} is read-only", key)));
            }
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<(), StorageError> {
            self.inner.remove(key)
        }
    }

    #[test]
    fn test_failed_write_restores_earlier_keys() {
        let inner = MemoryRepository::new();
        inner.set(ACCESS_KEY, "a0").unwrap();
        inner.set(REFRESH_KEY, "r0").unwrap();
        let store = TokenStore::new(Arc::new(RejectingRepository {
            inner,
            reject: REFRESH_KEY,
        }));

        let result = store.set_session(SessionUpdate::access("a1").with_refresh("r1"));

        assert!(matches!(result, Err(StorageError::Keychain(_))));
        assert_eq!(store.get_access(), "a0");
        assert_eq!(store.get_refresh(), "r0");
    }

    #[test]
    fn test_failed_write_removes_keys_that_were_absent() {
        let store = TokenStore::new(Arc::new(RejectingRepository {
            inner: MemoryRepository::new(),
            reject: USER_KEY,
        }));

        let result = store.set_session(
            SessionUpdate::access("a1")
                .with_refresh("r1")
                .with_identity(identity(Role::Intern)),
        );

        assert!(result.is_err());
        assert!(!store.has_credentials());
        assert_eq!(store.get_refresh(), "");
    }

    #[test]
    fn test_empty_fields_are_not_written() {
        let store = TokenStore::in_memory();
        store
            .set_session(SessionUpdate::access("a0").with_refresh("r0"))
            .unwrap();

        store
            .set_session(SessionUpdate::access("").with_refresh(""))
            .unwrap();

        assert_eq!(store.get_access(), "a0");
        assert_eq!(store.get_refresh(), "r0");
    }

    #[test]
    fn test_reads_are_normalized() {
        let repo = Arc::new(MemoryRepository::new());
        repo.set(ACCESS_KEY, "Bearer \"tok\"").unwrap();
        let store = TokenStore::new(repo);
        assert_eq!(store.get_access(), "tok");
        assert_eq!(store.get_refresh(), "");
        assert!(store.has_credentials());
    }

    #[test]
    fn test_identity_round_trip_and_corruption() {
        let repo = Arc::new(MemoryRepository::new());
        let store = TokenStore::new(repo.clone());
        assert!(store.get_identity().is_none());

        store
            .set_session(SessionUpdate::default().with_identity(identity(Role::Supervisor)))
            .unwrap();
        let cached = store.get_identity().unwrap();
        assert_eq!(cached.role, Role::Supervisor);
        assert_eq!(cached.display_name(), "Ada Intern");

        repo.set(USER_KEY, "{broken").unwrap();
        assert!(store.get_identity().is_none());
    }

    #[test]
    fn test_clear_session_is_idempotent() {
        let repo = Arc::new(MemoryRepository::new());
        let store = TokenStore::new(repo.clone());
        store
            .set_session(
                SessionUpdate::access("a")
                    .with_refresh("r")
                    .with_identity(identity(Role::Admin)),
            )
            .unwrap();
        assert_eq!(repo.len(), 3);

        store.clear_session().unwrap();
        assert!(repo.is_empty());
        assert!(!store.has_credentials());

        store.clear_session().unwrap();
        assert!(repo.is_empty());
    }

    fn decorated_token() -> impl Strategy<Value = (String, String)> {
        (
            "[A-Za-z0-9_.-]{1,48}",
            prop::option::of(prop::sample::select(vec!["Bearer ", "bearer  ", "BEARER\t"])),
            prop::option::of(prop::sample::select(vec!["\"", "'"])),
            "[ \t]{0,2}",
        )
            .prop_map(|(token, bearer, quote, pad)| {
                let quote = quote.unwrap_or("");
                let decorated = format!(
                    "{pad}{}{quote}{token}{quote}{pad}",
                    bearer.unwrap_or("")
                );
                (token, decorated)
            })
    }

    proptest! {
        /// Property: normalization recovers the bare token from any single
        /// layer of decoration, and is a no-op on its own output.
        #[test]
        fn normalize_is_idempotent((token, decorated) in decorated_token()) {
            let once = normalize_token(&decorated);
            prop_assert_eq!(&once, &token);
            prop_assert_eq!(normalize_token(&once), once.clone());
        }
    }
}
