//! CLI command handlers.
//!
//! Each handler takes the shared `AppState`, performs one user-facing action,
//! prints its result, and reports failure as a display string for `main`.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use reqwest::header::{HeaderName, HeaderValue};
use reqwest::Method;

use interntrack_client::api::client::path_with_query;
use interntrack_client::api::types::Role;
use interntrack_client::api::{auth, ApiError, RequestBody, RequestOptions};
use interntrack_client::config::StorageBackend;
use interntrack_client::session::AccessClaims;
use interntrack_client::AppState;

/// Log in with email + password and cache the session.
pub async fn login(state: &AppState, email: &str, password: &str) -> Result<(), String> {
    let identity = auth::login(&state.api, email, password)
        .await
        .map_err(|e| match e {
            auth::LoginError::NotVerified {
                detail,
                redirect_url: Some(url),
            } => format!("{} (check your inbox: {})", detail, url),
            other => other.to_string(),
        })?;

    println!("Logged in as {} [{}]", identity.display_name(), identity.role);
    Ok(())
}

/// Clear the local session.
pub async fn logout(state: &AppState) -> Result<(), String> {
    let redirect = auth::logout(&state.api).map_err(|e| format!("Logout failed: {}", e))?;
    println!("Logged out. Sign in again via {}", redirect);
    Ok(())
}

/// Print the cached identity, optionally requiring a role.
pub async fn whoami(state: &AppState, role: Option<Role>) -> Result<(), String> {
    let identity = match role {
        Some(role) => state.guard.require_role(role),
        None => state.guard.require_auth(),
    }
    .map_err(|e| e.to_string())?;

    println!("{}", identity.display_name());
    println!("  role:  {}", identity.role);
    if let Some(email) = &identity.email {
        println!("  email: {}", email);
    }
    Ok(())
}

/// Print storage backend, identity and token expiry without touching the network.
pub async fn status(state: &AppState) -> Result<(), String> {
    let storage = match state.config.storage {
        StorageBackend::Keychain => format!("keychain ({})", state.config.keychain_service),
        StorageBackend::File => match &state.config.session_file {
            Some(path) => format!("file ({})", path.display()),
            None => "file (default location)".to_string(),
        },
        StorageBackend::Memory => "memory".to_string(),
    };
    println!("API base: {}", state.api.base_url());
    println!("Storage:  {}", storage);

    if !state.store.has_credentials() {
        println!("Session:  none");
        return Ok(());
    }

    match state.store.get_identity() {
        Some(identity) => println!("User:     {} [{}]", identity.display_name(), identity.role),
        None => println!("User:     unknown (no cached identity)"),
    }

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    match state.store.access_claims() {
        Some(claims) if claims.is_expired_at(now) => {
            let ago = now - claims.exp.unwrap_or(now);
            println!("Access:   expired {}s ago (refreshed on next request)", ago)
        }
        Some(AccessClaims { exp: Some(exp), .. }) => {
            println!("Access:   valid for {}s", exp - now)
        }
        _ => println!("Access:   present (expiry unknown)"),
    }
    let refresh = if state.store.get_refresh().is_empty() { "absent" } else { "present" };
    println!("Refresh:  {}", refresh);
    Ok(())
}

/// Exchange the refresh token for a new access token.
pub async fn refresh(state: &AppState) -> Result<(), String> {
    if state.api.refresh_access_token().await {
        println!("Access token refreshed");
        Ok(())
    } else {
        Err("Refresh failed; run `interntrack login` if this persists".to_string())
    }
}

/// Arguments for an arbitrary API call.
pub struct RequestArgs {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub data: Option<String>,
    pub output: Option<PathBuf>,
}

/// Send an authenticated request and print the response.
pub async fn request(state: &AppState, args: RequestArgs) -> Result<(), String> {
    state.guard.require_auth().map_err(|e| e.to_string())?;

    let mut options = RequestOptions::new(args.method);
    for (name, value) in &args.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| format!("Invalid header name {:?}: {}", name, e))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| format!("Invalid header value for {}: {}", name, e))?;
        options = options.header(name, value);
    }
    if let Some(data) = args.data {
        options = options.body(RequestBody::Text(data));
    }

    let path = with_query(&args.path, &args.query);
    let resp = state
        .api
        .request(&path, options)
        .await
        .map_err(describe_api_error)?;

    eprintln!("{}", resp.status());
    match &args.output {
        Some(file) => {
            std::fs::write(file, resp.bytes())
                .map_err(|e| format!("Failed to write {}: {}", file.display(), e))?;
            eprintln!("Wrote {} bytes to {}", resp.bytes().len(), file.display());
        }
        None => match resp.json::<serde_json::Value>() {
            Ok(value) => println!(
                "{}",
                serde_json::to_string_pretty(&value).unwrap_or_else(|_| resp.text())
            ),
            Err(_) => println!("{}", resp.text()),
        },
    }

    if resp.is_success() {
        Ok(())
    } else {
        Err(format!("Request failed ({})", resp.status()))
    }
}

/// Download a file into the configured download directory.
pub async fn download(
    state: &AppState,
    path: &str,
    query: &[(String, String)],
    filename: Option<&str>,
) -> Result<(), String> {
    state.guard.require_auth().map_err(|e| e.to_string())?;

    let path = with_query(path, query);
    let saved = state
        .downloads
        .download(&path, filename)
        .await
        .map_err(|e| e.to_string())?;

    println!("Saved {} ({} bytes)", saved.path.display(), saved.size);
    Ok(())
}

fn with_query(path: &str, query: &[(String, String)]) -> String {
    let params: Vec<(&str, &str)> = query.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
    path_with_query(path, &params)
}

fn describe_api_error(err: ApiError) -> String {
    match err {
        ApiError::SessionTerminated { .. } => {
            format!("{}. Run `interntrack login` to start a new session.", err)
        }
        other => other.to_string(),
    }
}
