//! Request and response types for the DocAssist backend API.
//!
//! Every backend response is wrapped in an envelope carrying the payload in
//! `body` and a human-readable `result_message`.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Response envelope returned by every backend endpoint.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub body: Option<T>,
    #[serde(default)]
    pub result_message: Option<String>,
}

/// Paginated list payload (`body` of list endpoints).
#[derive(Debug, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
}

/// Login request body sent to POST /api/login/.
#[derive(Debug, Serialize)]
pub struct LoginRequest {
    pub username_or_email: String,
    pub password: String,
}

/// Login response body from POST /api/login/.
#[derive(Debug, Deserialize)]
pub struct LoginBody {
    pub access_token: String,
    pub refresh_token: String,
    pub expires: String,
    pub user: User,
}

/// Refresh request body sent to POST /api/refresh/.
#[derive(Debug, Serialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Refresh response body from POST /api/refresh/.
#[derive(Debug, Deserialize)]
pub struct RefreshBody {
    pub access_token: String,
    pub refresh_token: String,
    pub expires: String,
}

/// Authenticated user as returned by login and GET /api/whoami.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(default, deserialize_with = "opt_id_string")]
    pub id: Option<String>,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub groups: Vec<String>,
}

impl User {
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_string()
        }
    }
}

/// Parse a backend timestamp: RFC 3339, or offset-less ISO 8601 read as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Accept a numeric or string id as a string.
pub(crate) fn id_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    })
}

pub(crate) fn opt_id_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

#[derive(Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    result_message: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

/// Pull a readable message out of an error response body.
///
/// Prefers the envelope's `result_message`, then a `detail` field, then the
/// raw text.
pub fn error_message(text: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ErrorPayload>(text) {
        if let Some(message) = payload.result_message.or(payload.detail) {
            return message;
        }
    }
    text.trim().to_string()
}
