//! Client configuration.
//!
//! Defaults match the single-domain deployment: the dashboard and the API
//! share an origin and the API lives under `/api`. Environment variables
//! override the defaults; CLI flags override the environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::guard::Redirect;
use crate::session::{
    file, FileRepository, KeychainRepository, MemoryRepository, SessionRepository,
};

pub const DEFAULT_API_BASE: &str = "/api";
pub const DEFAULT_ORIGIN: &str = "http://localhost";
pub const DEFAULT_LOGIN_PAGE: &str = "login.html";
pub const DEFAULT_DASHBOARD_PAGE: &str = "dashboard.html";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown storage backend '{0}' (expected keychain, file or memory)")]
    UnknownStorage(String),

    #[error("Invalid {name}: {value}")]
    InvalidValue { name: &'static str, value: String },

    #[error("No config directory available for the session file; set INTERNTRACK_SESSION_FILE")]
    NoSessionPath,
}

/// Where session credentials are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum StorageBackend {
    /// Platform credential store.
    Keychain,
    /// JSON file in the user config directory.
    File,
    /// Process memory; nothing survives exit.
    Memory,
}

impl StorageBackend {
    /// Keychain where the platform store persists across reboots, otherwise
    /// the session file. Linux keyutils entries are lost on reboot.
    pub fn platform_default() -> Self {
        if cfg!(target_os = "linux") {
            StorageBackend::File
        } else {
            StorageBackend::Keychain
        }
    }
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keychain" => Ok(StorageBackend::Keychain),
            "file" => Ok(StorageBackend::File),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(ConfigError::UnknownStorage(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API base, absolute (`https://host/api`) or relative to `origin` (`/api`).
    pub api_base: String,
    /// Origin that anchors a relative `api_base`.
    pub origin: Option<String>,
    /// Unauthenticated entry point used on logout and session termination.
    pub login_page: String,
    /// Landing page for users who fail a role check.
    pub dashboard_page: String,
    pub storage: StorageBackend,
    /// Override for the file backend's location.
    pub session_file: Option<PathBuf>,
    pub keychain_service: String,
    pub download_dir: PathBuf,
    /// TCP connect timeout. Requests themselves are not time-limited.
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            origin: Some(DEFAULT_ORIGIN.to_string()),
            login_page: DEFAULT_LOGIN_PAGE.to_string(),
            dashboard_page: DEFAULT_DASHBOARD_PAGE.to_string(),
            storage: StorageBackend::platform_default(),
            session_file: None,
            keychain_service: crate::session::keychain::DEFAULT_SERVICE_NAME.to_string(),
            download_dir: dirs::download_dir().unwrap_or_else(|| PathBuf::from(".")),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `INTERNTRACK_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(base) = var("INTERNTRACK_API_BASE") {
            config.api_base = base;
        }
        if let Some(origin) = var("INTERNTRACK_ORIGIN") {
            config.origin = Some(origin);
        }
        if let Some(page) = var("INTERNTRACK_LOGIN_PAGE") {
            config.login_page = page;
        }
        if let Some(page) = var("INTERNTRACK_DASHBOARD_PAGE") {
            config.dashboard_page = page;
        }
        if let Some(storage) = var("INTERNTRACK_STORAGE") {
            config.storage = storage.parse()?;
        }
        if let Some(path) = var("INTERNTRACK_SESSION_FILE") {
            config.session_file = Some(PathBuf::from(path));
        }
        if let Some(service) = var("INTERNTRACK_KEYCHAIN_SERVICE") {
            config.keychain_service = service;
        }
        if let Some(dir) = var("INTERNTRACK_DOWNLOAD_DIR") {
            config.download_dir = PathBuf::from(dir);
        }
        if let Some(secs) = var("INTERNTRACK_CONNECT_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| ConfigError::InvalidValue {
                name: "INTERNTRACK_CONNECT_TIMEOUT_SECS",
                value: secs.clone(),
            })?;
            config.connect_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    pub fn login_redirect(&self) -> Redirect {
        Redirect::to(&self.login_page)
    }

    pub fn dashboard_redirect(&self) -> Redirect {
        Redirect::to(&self.dashboard_page)
    }

    /// Build the session repository for the configured backend.
    pub fn repository(&self) -> Result<Arc<dyn SessionRepository>, ConfigError> {
        let repo: Arc<dyn SessionRepository> = match self.storage {
            StorageBackend::Keychain => {
                Arc::new(KeychainRepository::new(&self.keychain_service))
            }
            StorageBackend::File => {
                let path = match &self.session_file {
                    Some(path) => path.clone(),
                    None => file::default_session_path().ok_or(ConfigError::NoSessionPath)?,
                };
                Arc::new(FileRepository::new(path))
            }
            StorageBackend::Memory => Arc::new(MemoryRepository::new()),
        };
        Ok(repo)
    }
}
