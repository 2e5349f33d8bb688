//! Route configuration: prefix entries, method classes, and auth policies.

use actix_web::http::Method;
use serde::{Deserialize, Serialize};

/// Classification of HTTP methods driving retry eligibility, cacheability,
/// and the default authentication policy.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MethodClass {
    /// GET, HEAD, OPTIONS: idempotent reads, retriable and cacheable.
    SafeRead,
    /// POST, PUT, PATCH, DELETE: never retried, never cached.
    Mutating,
}

impl MethodClass {
    pub fn of(method: &Method) -> Option<Self> {
        match method.as_str() {
            "GET" | "HEAD" | "OPTIONS" => Some(MethodClass::SafeRead),
            "POST" | "PUT" | "PATCH" | "DELETE" => Some(MethodClass::Mutating),
            _ => None,
        }
    }

    /// Default authentication policy when the route does not override it.
    pub fn default_auth(self) -> AuthPolicy {
        match self {
            MethodClass::SafeRead => AuthPolicy::Optional,
            MethodClass::Mutating => AuthPolicy::Required,
        }
    }
}

/// Authentication requirement for a resolved route.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthPolicy {
    /// Proceed without a user; any Authorization header is ignored.
    None,
    /// Proceed without a header, but a present-and-invalid header fails 401.
    Optional,
    /// Missing or invalid header fails 401.
    Required,
}

/// One entry of the routing table: a URL prefix bound to an upstream service.
///
/// # Examples
///
/// ```json
/// { "prefix": "games", "service": "game-catalog-service", "cache": true }
/// { "prefix": "auth", "service": "user-service", "auth": "none" }
/// ```
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RouteEntry {
    /// Second path segment matched against `/api/<prefix>/...`, case
    /// sensitive.
    pub prefix: String,

    /// Logical name of the target service descriptor.
    pub service: String,

    /// Overrides the method-class default when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthPolicy>,

    /// Whether safe-read responses on this prefix are cached.
    #[serde(default)]
    pub cache: bool,
}

impl RouteEntry {
    pub fn validate(&self) -> Result<(), String> {
        if self.prefix.is_empty() {
            return Err("route prefix must not be empty".to_string());
        }
        if self.prefix.contains('/') {
            return Err(format!(
                "route prefix '{}' must be a single path segment",
                self.prefix
            ));
        }
        if self.service.is_empty() {
            return Err(format!("route '{}' must name a service", self.prefix));
        }
        Ok(())
    }
}
