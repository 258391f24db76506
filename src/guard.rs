//! Session and role gating for protected operations.
//!
//! Mirrors the dashboard's page guards: without a cached identity the user is
//! sent to the login entry point, with the wrong role to the dashboard.
//! Gating is a convenience for the client only; the API enforces access.

use std::fmt;

use thiserror::Error;

use crate::api::types::{Identity, Role};
use crate::session::{StorageError, TokenStore};

/// Navigation target produced when a session ends or access is refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect(String);

impl Redirect {
    pub fn to(target: impl Into<String>) -> Self {
        Self(target.into())
    }

    pub fn target(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Redirect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error)]
pub enum GuardError {
    #[error("Not signed in, continue at {redirect}")]
    Unauthenticated { redirect: Redirect },

    #[error("Access denied: requires {required}, signed in as {actual}")]
    Forbidden {
        required: Role,
        actual: Role,
        redirect: Redirect,
    },
}

impl GuardError {
    pub fn redirect(&self) -> &Redirect {
        match self {
            GuardError::Unauthenticated { redirect } | GuardError::Forbidden { redirect, .. } => {
                redirect
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionGuard {
    store: TokenStore,
    login: Redirect,
    dashboard: Redirect,
}

impl SessionGuard {
    pub fn new(store: TokenStore, login: Redirect, dashboard: Redirect) -> Self {
        Self {
            store,
            login,
            dashboard,
        }
    }

    /// Require an access credential and a cached identity.
    pub fn require_auth(&self) -> Result<Identity, GuardError> {
        let identity = if self.store.has_credentials() {
            self.store.get_identity()
        } else {
            None
        };
        identity.ok_or_else(|| GuardError::Unauthenticated {
            redirect: self.login.clone(),
        })
    }

    /// Require a signed-in user with exactly `role`.
    pub fn require_role(&self, role: Role) -> Result<Identity, GuardError> {
        let identity = self.require_auth()?;
        if identity.role != role {
            log::info!(
                "Role check failed: requires {}, user has {}",
                role,
                identity.role
            );
            return Err(GuardError::Forbidden {
                required: role,
                actual: identity.role,
                redirect: self.dashboard.clone(),
            });
        }
        Ok(identity)
    }

    /// Clear the session and point at the login entry point.
    pub fn logout(&self) -> Result<Redirect, StorageError> {
        self.store.clear_session()?;
        Ok(self.login.clone())
    }
}
