//! Application state for the InternTrack client.
//!
//! Wires one `TokenStore` into the API client, the session guard and the
//! download helper so they all observe the same session.

use std::sync::Arc;

use crate::api::client::ApiClient;
use crate::api::download::{DownloadHelper, FsSaveTarget};
use crate::config::{ClientConfig, ConfigError};
use crate::guard::SessionGuard;
use crate::session::TokenStore;

pub struct AppState {
    pub config: ClientConfig,

    /// Shared session store (credentials + cached identity).
    pub store: TokenStore,

    /// HTTP client for InternTrack API communication.
    pub api: Arc<ApiClient>,

    pub guard: SessionGuard,

    /// Saves authenticated downloads into `config.download_dir`.
    pub downloads: DownloadHelper<FsSaveTarget>,
}

impl AppState {
    /// Build the state for `config`, opening its session repository.
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        let store = TokenStore::new(config.repository()?);
        Ok(Self::with_store(config, store))
    }

    /// Build the state around an existing store.
    pub fn with_store(config: ClientConfig, store: TokenStore) -> Self {
        let api = Arc::new(ApiClient::new(&config, store.clone()));
        let guard = SessionGuard::new(
            store.clone(),
            config.login_redirect(),
            config.dashboard_redirect(),
        );
        let downloads =
            DownloadHelper::new(api.clone(), FsSaveTarget::new(config.download_dir.clone()));

        Self {
            config,
            store,
            api,
            guard,
            downloads,
        }
    }
}
