//! Buffered API responses and their authentication classification.

use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use super::ApiError;

/// Substrings in a 401 body that mean the access token itself was rejected,
/// as opposed to the user lacking permission. Matched case-insensitively.
pub const INVALIDITY_MARKERS: [&str; 3] =
    ["token_not_valid", "given token not valid", "token is invalid"];

/// A fully-read HTTP response.
///
/// The body is buffered up front so the client can inspect a 401 for
/// invalidity markers and still hand the untouched response to the caller.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Read a `reqwest` response to completion.
    pub(crate) async fn read(resp: reqwest::Response) -> Result<Self, ApiError> {
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.bytes().await.map_err(ApiError::Network)?;
        Ok(Self::new(status, headers, body.to_vec()))
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Value of the `Content-Type` header, if present and valid UTF-8.
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    pub fn bytes(&self) -> &[u8] {
        &self.body
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.body
    }

    /// Body as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Deserialize the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_slice(&self.body).map_err(|e| ApiError::Decode {
            status: self.status.as_u16(),
            message: e.to_string(),
        })
    }

    /// Turn a non-2xx response into `ApiError::Status`.
    pub fn error_for_status(self) -> Result<Self, ApiError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ApiError::Status {
                status: self.status.as_u16(),
                body: self.text(),
            })
        }
    }

    /// Whether the body carries one of the `INVALIDITY_MARKERS`.
    pub fn has_invalidity_marker(&self) -> bool {
        let body = self.text().to_lowercase();
        INVALIDITY_MARKERS.iter().any(|marker| body.contains(marker))
    }

    pub fn outcome(&self) -> Outcome {
        Outcome::classify(self)
    }
}

/// How a response relates to the session's authentication state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// 2xx.
    Success,
    /// 401 whose body says the access token is invalid or expired; a refresh may fix it.
    AuthExpired,
    /// 401 without an invalidity marker; a genuine permission denial.
    AuthInvalidPermanently,
    /// Anything else.
    OtherError,
}

impl Outcome {
    pub fn classify(resp: &ApiResponse) -> Self {
        if resp.is_success() {
            Outcome::Success
        } else if resp.status() == StatusCode::UNAUTHORIZED {
            if resp.has_invalidity_marker() {
                Outcome::AuthExpired
            } else {
                Outcome::AuthInvalidPermanently
            }
        } else {
            Outcome::OtherError
        }
    }
}
