//! HTTP client with bearer-token injection and one-shot refresh-and-retry.
//!
//! Every call reads the access token from the `TokenStore`, so a refresh
//! performed by any other caller is picked up on the next request. A 401 whose
//! body marks the token as invalid triggers exactly one refresh and one retry;
//! if the refresh fails the session is cleared.

use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::refresh::RefreshCoordinator;
use super::response::{ApiResponse, Outcome};
use super::ApiError;
use crate::config::ClientConfig;
use crate::guard::Redirect;
use crate::session::{StorageError, TokenStore};

fn json_value() -> HeaderValue {
    HeaderValue::from_static("application/json")
}

/// Strip trailing slashes from `base` and anchor a relative base on `origin`.
pub fn normalize_base(base: &str, origin: Option<&str>) -> String {
    let base = base.trim().trim_end_matches('/');
    if base.contains("://") {
        return base.to_string();
    }
    match origin.map(|o| o.trim().trim_end_matches('/')) {
        Some(origin) if !origin.is_empty() => {
            join_url(origin, base).trim_end_matches('/').to_string()
        }
        _ => base.to_string(),
    }
}

/// Join a normalized base and a relative path with exactly one `/`.
pub fn join_url(base: &str, path: &str) -> String {
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

/// Append URL-encoded query parameters to `path`.
pub fn path_with_query(path: &str, params: &[(&str, &str)]) -> String {
    if params.is_empty() {
        return path.to_string();
    }
    let query = params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    let separator = if path.contains('?') { '&' } else { '?' };
    format!("{}{}{}", path, separator, query)
}

/// Request payload. Kept owned and cloneable so a retry can resend it.
#[derive(Debug, Clone)]
pub enum RequestBody {
    /// Serialized as JSON; gets `Content-Type: application/json` unless set.
    Json(serde_json::Value),
    /// Pre-serialized JSON text; gets `Content-Type: application/json` unless set.
    Text(String),
    /// Raw bytes; content type is left to the caller.
    Bytes(Vec<u8>),
    /// multipart/form-data, rebuilt for every attempt.
    Multipart(Vec<FormPart>),
}

impl RequestBody {
    fn is_json(&self) -> bool {
        matches!(self, RequestBody::Json(_) | RequestBody::Text(_))
    }
}

#[derive(Debug, Clone)]
pub struct FormPart {
    pub name: String,
    pub value: PartValue,
}

#[derive(Debug, Clone)]
pub enum PartValue {
    Text(String),
    File {
        bytes: Vec<u8>,
        file_name: String,
        mime: Option<String>,
    },
}

/// Method, caller headers and body for one logical request.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<RequestBody>,
}

impl RequestOptions {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    pub fn get() -> Self {
        Self::new(Method::GET)
    }

    pub fn post() -> Self {
        Self::new(Method::POST)
    }

    /// Caller headers win over every computed default.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn json<T: Serialize>(self, value: &T) -> Result<Self, ApiError> {
        let value = serde_json::to_value(value).map_err(|e| ApiError::Encode(e.to_string()))?;
        Ok(self.body(RequestBody::Json(value)))
    }
}

/// How the `Authorization` header is applied to an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthHeader {
    /// First attempt: only when the caller did not set one.
    IfAbsent,
    /// Retry after refresh: always carry the refreshed token.
    Replace,
}

/// Build the headers for one attempt from caller headers plus defaults.
///
/// Pure: the caller's map is never mutated, so every attempt starts from the
/// same input.
pub fn build_headers(
    caller: &HeaderMap,
    body: Option<&RequestBody>,
    access: &str,
    auth: AuthHeader,
) -> HeaderMap {
    let mut headers = caller.clone();

    if !headers.contains_key(ACCEPT) {
        headers.insert(ACCEPT, json_value());
    }
    if body.is_some_and(RequestBody::is_json) && !headers.contains_key(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, json_value());
    }

    let wants_auth = auth == AuthHeader::Replace || !headers.contains_key(AUTHORIZATION);
    if !access.is_empty() && wants_auth {
        match HeaderValue::from_str(&format!("Bearer {}", access)) {
            Ok(mut value) => {
                value.set_sensitive(true);
                headers.insert(AUTHORIZATION, value);
            }
            Err(_) => {
                log::warn!("Stored access token is not a valid header value, sending without it")
            }
        }
    }

    headers
}

/// Where one `request` call is in the refresh-and-retry protocol.
///
/// `Initial --401 + marker--> Refreshing --refreshed--> Retried`. The call
/// ends in Success (any non-expired response), Denied (401 without marker,
/// returned as-is) or LoggedOut (refresh failed, session cleared).
#[derive(Debug)]
enum Flow {
    Initial,
    Refreshing { rejected: StatusCode },
    Retried,
}

/// HTTP client wrapper for InternTrack API communication.
///
/// Owns the resolved base URL and reads credentials through the shared
/// `TokenStore`. Cheap to share behind an `Arc`.
#[derive(Debug)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    store: TokenStore,
    refresher: RefreshCoordinator,
    login: Redirect,
}

impl ApiClient {
    /// Create a client for the configured base URL.
    pub fn new(config: &ClientConfig, store: TokenStore) -> Self {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        let base_url = normalize_base(&config.api_base, config.origin.as_deref());
        Self::with_http(http, &base_url, store, config.login_redirect())
    }

    /// Create a client around an existing `reqwest::Client`.
    pub fn with_http(http: Client, base_url: &str, store: TokenStore, login: Redirect) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        let refresher = RefreshCoordinator::new(http.clone(), &base_url, store.clone());
        Self {
            http,
            base_url,
            store,
            refresher,
            login,
        }
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    pub fn refresher(&self) -> &RefreshCoordinator {
        &self.refresher
    }

    /// Full URL for a relative API path. An empty path resolves to the base.
    pub fn url(&self, path: &str) -> String {
        let path = if path.is_empty() { "/" } else { path };
        join_url(&self.base_url, path)
    }

    /// Send an authenticated request, refreshing and retrying once if the
    /// access token has been rejected.
    ///
    /// Issues at most two requests to `path` and at most one refresh call.
    /// Network failures are returned as `ApiError::Network`; a failed refresh
    /// clears the session and returns `ApiError::SessionTerminated`.
    pub async fn request(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<ApiResponse, ApiError> {
        let url = self.url(path);
        let mut flow = Flow::Initial;

        loop {
            flow = match flow {
                Flow::Initial => {
                    let headers = self.headers_for(&options, AuthHeader::IfAbsent);
                    let resp = self.send(&url, &options, headers).await?;
                    match resp.outcome() {
                        Outcome::AuthExpired => {
                            log::info!(
                                "Access token rejected for {} {}, refreshing",
                                options.method,
                                path
                            );
                            Flow::Refreshing {
                                rejected: resp.status(),
                            }
                        }
                        Outcome::AuthInvalidPermanently => {
                            log::debug!("{} {} denied without token marker", options.method, path);
                            return Ok(resp);
                        }
                        Outcome::Success | Outcome::OtherError => return Ok(resp),
                    }
                }
                Flow::Refreshing { rejected } => {
                    if self.refresher.refresh_access_token().await {
                        Flow::Retried
                    } else {
                        return Err(self.terminate(rejected));
                    }
                }
                Flow::Retried => {
                    let headers = self.headers_for(&options, AuthHeader::Replace);
                    return self.send(&url, &options, headers).await;
                }
            };
        }
    }

    /// Authenticated GET.
    pub async fn get(&self, path: &str) -> Result<ApiResponse, ApiError> {
        self.request(path, RequestOptions::get()).await
    }

    /// Authenticated GET, requiring 2xx and decoding the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.get(path).await?.error_for_status()?.json()
    }

    /// Authenticated POST with a JSON body.
    pub async fn post_json<T: Serialize>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<ApiResponse, ApiError> {
        self.request(path, RequestOptions::post().json(body)?).await
    }

    /// Send an unauthenticated POST with a JSON body.
    /// Used for login, where no access token exists yet and a 401 must not
    /// trigger a refresh.
    pub async fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<ApiResponse, ApiError> {
        let resp = self
            .http
            .post(self.url(path))
            .header(ACCEPT, json_value())
            .json(body)
            .send()
            .await
            .map_err(ApiError::Network)?;
        ApiResponse::read(resp).await
    }

    /// Refresh the access token now. See `RefreshCoordinator`.
    pub async fn refresh_access_token(&self) -> bool {
        self.refresher.refresh_access_token().await
    }

    /// Clear the session and return the login entry point.
    pub fn end_session(&self) -> Result<Redirect, StorageError> {
        self.store.clear_session()?;
        Ok(self.login.clone())
    }

    fn headers_for(&self, options: &RequestOptions, auth: AuthHeader) -> HeaderMap {
        let access = self.store.get_access();
        build_headers(&options.headers, options.body.as_ref(), &access, auth)
    }

    fn terminate(&self, status: StatusCode) -> ApiError {
        log::warn!("Token refresh failed, ending session");
        if let Err(e) = self.store.clear_session() {
            log::error!("Failed to clear session after refresh failure: {}", e);
        }
        ApiError::SessionTerminated {
            status: status.as_u16(),
            redirect: self.login.clone(),
        }
    }

    async fn send(
        &self,
        url: &str,
        options: &RequestOptions,
        headers: HeaderMap,
    ) -> Result<ApiResponse, ApiError> {
        let builder = self.http.request(options.method.clone(), url).headers(headers);

        let builder = match &options.body {
            None => builder,
            Some(RequestBody::Json(value)) => {
                let bytes =
                    serde_json::to_vec(value).map_err(|e| ApiError::Encode(e.to_string()))?;
                builder.body(bytes)
            }
            Some(RequestBody::Text(text)) => builder.body(text.clone()),
            Some(RequestBody::Bytes(bytes)) => builder.body(bytes.clone()),
            Some(RequestBody::Multipart(parts)) => builder.multipart(to_form(parts)?),
        };

        let resp = builder.send().await.map_err(ApiError::Network)?;
        ApiResponse::read(resp).await
    }
}

fn to_form(parts: &[FormPart]) -> Result<Form, ApiError> {
    let mut form = Form::new();
    for part in parts {
        form = match &part.value {
            PartValue::Text(text) => form.text(part.name.clone(), text.clone()),
            PartValue::File {
                bytes,
                file_name,
                mime,
            } => {
                let mut file = Part::bytes(bytes.clone()).file_name(file_name.clone());
                if let Some(mime) = mime {
                    file = file.mime_str(mime).map_err(|e| {
                        ApiError::Encode(format!("invalid mime type {}: {}", mime, e))
                    })?;
                }
                form.part(part.name.clone(), file)
            }
        };
    }
    Ok(form)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base() {
        assert_eq!(normalize_base("/api", Some("http://localhost")), "http://localhost/api");
        assert_eq!(normalize_base("/api///", Some("http://host/")), "http://host/api");
        assert_eq!(normalize_base("api", Some("http://host")), "http://host/api");
        assert_eq!(
            normalize_base("https://api.example.com/api/", Some("http://ignored")),
            "https://api.example.com/api"
        );
        assert_eq!(normalize_base("/", Some("http://host")), "http://host");
        assert_eq!(normalize_base("/api/", None), "/api");
    }

    #[test]
    fn test_url_joins_with_single_slash() {
        let client = ApiClient::with_http(
            Client::new(),
            "http://host/api/",
            TokenStore::in_memory(),
            Redirect::to("login.html"),
        );
        assert_eq!(client.base_url(), "http://host/api");
        assert_eq!(client.url("/reports/"), "http://host/api/reports/");
        assert_eq!(client.url("reports/"), "http://host/api/reports/");
        assert_eq!(client.url(""), "http://host/api/");
    }

    #[test]
    fn test_path_with_query() {
        assert_eq!(path_with_query("/r/", &[]), "/r/");
        assert_eq!(
            path_with_query("/r/", &[("year", "2026"), ("q", "a b&c")]),
            "/r/?year=2026&q=a%20b%26c"
        );
        assert_eq!(path_with_query("/r/?x=1", &[("y", "2")]), "/r/?x=1&y=2");
    }

    #[test]
    fn test_headers_defaults() {
        let headers = build_headers(
            &HeaderMap::new(),
            Some(&RequestBody::Json(serde_json::json!({"a": 1}))),
            "tok",
            AuthHeader::IfAbsent,
        );
        assert_eq!(headers[ACCEPT], "application/json");
        assert_eq!(headers[CONTENT_TYPE], "application/json");
        assert_eq!(headers[AUTHORIZATION], "Bearer tok");
        assert!(headers[AUTHORIZATION].is_sensitive());
    }

    #[test]
    fn test_headers_caller_wins() {
        let mut caller = HeaderMap::new();
        caller.insert(ACCEPT, HeaderValue::from_static("*/*"));
        caller.insert(CONTENT_TYPE, HeaderValue::from_static("text/csv"));
        caller.insert(AUTHORIZATION, HeaderValue::from_static("Bearer caller"));

        let headers = build_headers(
            &caller,
            Some(&RequestBody::Text("a,b".into())),
            "tok",
            AuthHeader::IfAbsent,
        );
        assert_eq!(headers[ACCEPT], "*/*");
        assert_eq!(headers[CONTENT_TYPE], "text/csv");
        assert_eq!(headers[AUTHORIZATION], "Bearer caller");

        // Caller map is untouched and the retry carries the refreshed token.
        let retry = build_headers(&caller, None, "fresh", AuthHeader::Replace);
        assert_eq!(retry[AUTHORIZATION], "Bearer fresh");
        assert_eq!(caller[AUTHORIZATION], "Bearer caller");
    }

    #[test]
    fn test_headers_binary_bodies_get_no_json_content_type() {
        for body in [
            RequestBody::Bytes(vec![1, 2, 3]),
            RequestBody::Multipart(vec![FormPart {
                name: "file".into(),
                value: PartValue::Text("x".into()),
            }]),
        ] {
            let headers = build_headers(&HeaderMap::new(), Some(&body), "", AuthHeader::IfAbsent);
            assert!(!headers.contains_key(CONTENT_TYPE));
        }
    }

    #[test]
    fn test_headers_without_token() {
        let headers = build_headers(&HeaderMap::new(), None, "", AuthHeader::Replace);
        assert!(!headers.contains_key(AUTHORIZATION));
        assert!(!headers.contains_key(CONTENT_TYPE));
    }

    #[test]
    fn test_invalid_mime_is_an_encode_error() {
        let parts = vec![FormPart {
            name: "file".into(),
            value: PartValue::File {
                bytes: vec![0],
                file_name: "a.bin".into(),
                mime: Some("not a mime".into()),
            },
        }];
        assert!(matches!(to_form(&parts), Err(ApiError::Encode(_))));
    }
}
