//! API client module for the InternTrack dashboard backend.
//!
//! Provides the HTTP client with bearer-token injection and one-shot
//! refresh-and-retry, the refresh coordinator, authenticated downloads,
//! login flows, and request/response types matching the backend API.

pub mod auth;
pub mod client;
pub mod download;
pub mod refresh;
pub mod response;
pub mod types;

pub use client::{ApiClient, FormPart, PartValue, RequestBody, RequestOptions};
pub use download::{DownloadError, DownloadHelper, FsSaveTarget, SaveTarget};
pub use refresh::RefreshCoordinator;
pub use response::{ApiResponse, Outcome};

use thiserror::Error;

use crate::guard::Redirect;

#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never produced a response (DNS, TLS, connection reset, ...).
    #[error("Request failed: {0}")]
    Network(#[source] reqwest::Error),

    /// Access token was rejected and could not be refreshed; the session has
    /// been cleared.
    #[error("Session expired ({status}), sign in again at {redirect}")]
    SessionTerminated { status: u16, redirect: Redirect },

    #[error("Failed to encode request body: {0}")]
    Encode(String),

    #[error("Failed to parse response ({status}): {message}")]
    Decode { status: u16, message: String },

    #[error("Request failed ({status}): {body}")]
    Status { status: u16, body: String },
}

impl ApiError {
    /// HTTP status attached to the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Network(e) => e.status().map(|s| s.as_u16()),
            ApiError::SessionTerminated { status, .. }
            | ApiError::Decode { status, .. }
            | ApiError::Status { status, .. } => Some(*status),
            ApiError::Encode(_) => None,
        }
    }
}
