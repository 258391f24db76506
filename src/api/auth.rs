//! Login and logout flows.
//!
//! Login exchanges email + password for a SimpleJWT token pair, stores it,
//! then fetches `/me/` and caches the identity. The session is only left in
//! place once both steps have succeeded.

use thiserror::Error;

use super::types::{ErrorBody, Identity, LoginRequest, LoginResponse};
use super::{ApiClient, ApiError};
use crate::guard::Redirect;
use crate::session::{SessionUpdate, StorageError};

/// Token-obtain endpoint, relative to the API base.
pub const TOKEN_PATH: &str = "/token/";
/// Identity endpoint, relative to the API base.
pub const ME_PATH: &str = "/me/";

/// `action` value the backend sends for accounts that are not verified yet.
const VERIFY_EMAIL_ACTION: &str = "VERIFY_EMAIL";

#[derive(Debug, Error)]
pub enum LoginError {
    /// Credentials are right but the account still awaits verification.
    #[error("{detail}")]
    NotVerified {
        detail: String,
        redirect_url: Option<String>,
    },

    #[error("Login failed ({status}): {detail}")]
    Rejected { status: u16, detail: String },

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Failed to store session: {0}")]
    Storage(#[from] StorageError),
}

/// Log in and cache the session. Any previous session is replaced.
pub async fn login(api: &ApiClient, email: &str, password: &str) -> Result<Identity, LoginError> {
    let email = email.trim();
    log::info!("Logging in as {}", email);

    let login_req = LoginRequest {
        email: email.to_string(),
        password: password.to_string(),
    };
    let resp = api.post(TOKEN_PATH, &login_req).await?;

    if !resp.is_success() {
        let status = resp.status().as_u16();
        let body: ErrorBody = resp.json().unwrap_or_default();
        let detail = body.detail.unwrap_or_else(|| resp.text());

        if body.action.as_deref() == Some(VERIFY_EMAIL_ACTION) {
            return Err(LoginError::NotVerified {
                detail,
                redirect_url: body.redirect_url,
            });
        }
        return Err(LoginError::Rejected { status, detail });
    }

    let tokens: LoginResponse = resp.json()?;

    let store = api.store();
    store.clear_session()?;
    store.set_session(SessionUpdate::access(tokens.access).with_refresh(tokens.refresh))?;

    let identity = match fetch_identity(api).await {
        Ok(identity) => identity,
        Err(e) => {
            log::warn!("Identity fetch after login failed: {}", e);
            if let Err(clear_err) = store.clear_session() {
                log::error!("Failed to clear partial session: {}", clear_err);
            }
            return Err(e.into());
        }
    };

    store.set_session(SessionUpdate::default().with_identity(identity.clone()))?;
    log::info!("Logged in as {} ({})", identity.display_name(), identity.role);
    Ok(identity)
}

/// GET /me/ with the current session.
pub async fn fetch_identity(api: &ApiClient) -> Result<Identity, ApiError> {
    api.get_json(ME_PATH).await
}

/// Clear the local session and return the login entry point.
///
/// SimpleJWT tokens are stateless, so there is no server call to make.
pub fn logout(api: &ApiClient) -> Result<Redirect, StorageError> {
    log::info!("Logging out");
    api.end_session()
}
