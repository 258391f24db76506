//! Authenticated HTTP client for the InternTrack dashboard API.
//!
//! Attaches bearer tokens to every request, refreshes an expired access token
//! once and retries, ends the session when the refresh fails, and saves
//! authenticated binary downloads. Credentials persist through a pluggable
//! `SessionRepository` (OS keychain, JSON file or memory).

pub mod api;
pub mod config;
pub mod guard;
pub mod session;
pub mod state;

pub use api::{ApiClient, ApiError, ApiResponse, Outcome, RequestBody, RequestOptions};
pub use config::ClientConfig;
pub use guard::{GuardError, Redirect, SessionGuard};
pub use session::{normalize_token, SessionUpdate, TokenStore};
pub use state::AppState;
