//! Request and response types for the InternTrack backend API.
//!
//! Field names match the backend's snake_case JSON (Django REST Framework +
//! SimpleJWT).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Login request body sent to POST /token/.
#[derive(Debug, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Token pair returned by POST /token/.
#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub access: String,
    pub refresh: String,
}

/// Refresh request body sent to POST /token/refresh/.
#[derive(Debug, Serialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

/// Refresh response from POST /token/refresh/.
///
/// `refresh` is only present when the backend rotates refresh tokens.
#[derive(Debug, Deserialize)]
pub struct RefreshResponse {
    #[serde(default)]
    pub access: String,
    #[serde(default)]
    pub refresh: Option<String>,
}

/// Error body returned by DRF views, e.g. a rejected login.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default, deserialize_with = "detail_text")]
    pub detail: Option<String>,
    /// Follow-up the client should take, e.g. `VERIFY_EMAIL`.
    #[serde(default, deserialize_with = "detail_text")]
    pub action: Option<String>,
    #[serde(default, deserialize_with = "detail_text")]
    pub redirect_url: Option<String>,
}

// DRF validation errors wrap messages in lists: {"detail": ["..."]}.
fn detail_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Array(items)) => items
            .into_iter()
            .find_map(|item| item.as_str().map(str::to_string)),
        _ => None,
    })
}

/// Dashboard role of the logged-in user.
///
/// Roles the dashboard does not know are kept as `Other` so the user still
/// counts as signed in; only role checks fail for them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
    Admin,
    Supervisor,
    Intern,
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::Admin => "ADMIN",
            Role::Supervisor => "SUPERVISOR",
            Role::Intern => "INTERN",
            Role::Other(role) => role,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    /// Case-insensitive. Unknown names become `Other` in upper case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "" => Err("Role is empty".to_string()),
            "ADMIN" => Ok(Role::Admin),
            "SUPERVISOR" => Ok(Role::Supervisor),
            "INTERN" => Ok(Role::Intern),
            other => Ok(Role::Other(other.to_string())),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        match role {
            Role::Other(role) => role,
            known => known.as_str().to_string(),
        }
    }
}

/// Identity returned by GET /me/ and cached under the `user` key.
///
/// Client-side gating only; the server stays the source of truth for
/// authorization. Unknown fields are preserved so the cache round-trips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Identity {
    /// Human-readable name: full name, then name, then email.
    pub fn display_name(&self) -> &str {
        [&self.full_name, &self.name, &self.email]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|s| !s.trim().is_empty())
            .unwrap_or("User")
    }
}
