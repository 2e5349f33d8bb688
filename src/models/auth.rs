//! Authenticated user identity attached to a request.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identity returned by the user service for a validated bearer token.
///
/// Lives for a single request; it is never cached across requests.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AuthenticatedUser {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl AuthenticatedUser {
    /// Builds an identity from the user service's profile payload.
    ///
    /// `id` falls back to the legacy `userId` field; a profile with neither
    /// is invalid and yields `None`.
    pub fn from_profile(profile: &Value) -> Option<Self> {
        let id = profile
            .get("id")
            .or_else(|| profile.get("userId"))
            .and_then(value_as_id)?;

        let email = profile
            .get("email")
            .and_then(Value::as_str)
            .map(str::to_string);

        Some(Self {
            id,
            email,
            roles: string_list(profile.get("roles")),
            permissions: string_list(profile.get("permissions")),
        })
    }
}

fn value_as_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
