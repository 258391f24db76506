//! Access-token refresh against POST /token/refresh/.
//!
//! Every failure (no stored refresh token, network error, non-2xx, malformed
//! body) collapses to `false`, and nothing is written to the store unless the
//! exchange succeeded.

use reqwest::header::ACCEPT;
use reqwest::Client;

use super::client::join_url;
use super::types::{RefreshRequest, RefreshResponse};
use crate::session::{SessionUpdate, TokenStore};

/// Refresh endpoint, relative to the API base.
pub const REFRESH_PATH: &str = "/token/refresh/";

/// Exchanges the stored refresh token for a new access token.
///
/// There is no single-flight guard: concurrent callers each perform their own
/// exchange and the last write to the store wins.
#[derive(Debug, Clone)]
pub struct RefreshCoordinator {
    http: Client,
    url: String,
    store: TokenStore,
}

impl RefreshCoordinator {
    pub fn new(http: Client, base_url: &str, store: TokenStore) -> Self {
        Self {
            http,
            url: join_url(base_url.trim_end_matches('/'), REFRESH_PATH),
            store,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns `true` once a new access token has been stored.
    pub async fn refresh_access_token(&self) -> bool {
        let refresh = self.store.get_refresh();
        if refresh.is_empty() {
            log::info!("No refresh token stored, refresh skipped");
            return false;
        }

        let tokens = match self.exchange(refresh).await {
            Ok(tokens) => tokens,
            Err(reason) => {
                log::warn!("Token refresh failed: {}", reason);
                return false;
            }
        };

        // A rotated refresh token is stored alongside the new access token.
        let mut update = SessionUpdate::access(tokens.access);
        update.refresh = tokens.refresh;

        match self.store.set_session(update) {
            Ok(()) => {
                log::info!("Access token refreshed");
                true
            }
            Err(e) => {
                log::warn!("Failed to store refreshed token: {}", e);
                false
            }
        }
    }

    async fn exchange(&self, refresh: String) -> Result<RefreshResponse, String> {
        let resp = self
            .http
            .post(&self.url)
            .header(ACCEPT, "application/json")
            .json(&RefreshRequest { refresh })
            .send()
            .await
            .map_err(|e| format!("network error: {}", e))?;

        if !resp.status().is_success() {
            return Err(format!("refresh endpoint returned {}", resp.status()));
        }

        let tokens: RefreshResponse = resp
            .json()
            .await
            .map_err(|e| format!("malformed refresh response: {}", e))?;

        if tokens.access.trim().is_empty() {
            return Err("refresh response has no access token".to_string());
        }
        Ok(tokens)
    }
}
