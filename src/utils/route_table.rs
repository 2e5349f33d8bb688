//! Prefix routing table.
//!
//! Resolution is a pure function of `(method, path)`: the table is compiled
//! once at startup from configuration and never mutated. The gateway's
//! top-level `/api` segment is stripped, the next segment is matched
//! case-sensitively against the table, and the remainder (including that
//! segment) is what the upstream sees.

use crate::models::route::{AuthPolicy, MethodClass, RouteEntry};
use crate::models::service::ServiceDescriptor;
use actix_web::http::Method;
use ahash::HashMap as AHashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum RouteMatchError {
    #[error("no matching route found for path: {path}")]
    NoMatch { path: String },
    #[error("method {method} is not routable")]
    UnsupportedMethod { method: String },
    #[error("route '{prefix}' references unknown service '{service}'")]
    UnknownService { prefix: String, service: String },
}

/// Result of resolving a request against the table.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub service: Arc<ServiceDescriptor>,
    /// The matched prefix, also the rate-limit bucket component.
    pub prefix: String,
    /// Path as the upstream should see it (leading `/api` stripped).
    pub remainder: String,
    pub method_class: MethodClass,
    pub auth: AuthPolicy,
    pub cache_enabled: bool,
}

#[derive(Debug, Clone)]
struct CompiledEntry {
    service: Arc<ServiceDescriptor>,
    auth_override: Option<AuthPolicy>,
    cache_enabled: bool,
}

/// Immutable prefix table with O(1) lookups.
#[derive(Debug)]
pub struct RouteTable {
    entries: AHashMap<String, CompiledEntry>,
}

impl RouteTable {
    pub fn new(
        routes: &[RouteEntry],
        services: &[Arc<ServiceDescriptor>],
    ) -> Result<Self, RouteMatchError> {
        let by_name: AHashMap<&str, &Arc<ServiceDescriptor>> =
            services.iter().map(|s| (s.name.as_str(), s)).collect();

        let mut entries = AHashMap::default();
        for route in routes {
            let service = by_name.get(route.service.as_str()).ok_or_else(|| {
                RouteMatchError::UnknownService {
                    prefix: route.prefix.clone(),
                    service: route.service.clone(),
                }
            })?;
            entries.insert(
                route.prefix.clone(),
                CompiledEntry {
                    service: Arc::clone(service),
                    auth_override: route.auth,
                    cache_enabled: route.cache,
                },
            );
        }

        Ok(Self { entries })
    }

    /// Resolves `(method, path)` to a target service, or fails with
    /// `NoMatch` / `UnsupportedMethod`.
    pub fn resolve(&self, method: &Method, path: &str) -> Result<RouteMatch, RouteMatchError> {
        let method_class =
            MethodClass::of(method).ok_or_else(|| RouteMatchError::UnsupportedMethod {
                method: method.to_string(),
            })?;

        let (prefix, remainder) = split_prefix(path).ok_or_else(|| RouteMatchError::NoMatch {
            path: path.to_string(),
        })?;

        let entry = self
            .entries
            .get(prefix)
            .ok_or_else(|| RouteMatchError::NoMatch {
                path: path.to_string(),
            })?;

        Ok(RouteMatch {
            service: Arc::clone(&entry.service),
            prefix: prefix.to_string(),
            remainder,
            method_class,
            auth: entry
                .auth_override
                .unwrap_or_else(|| method_class.default_auth()),
            cache_enabled: entry.cache_enabled,
        })
    }
}

/// Extracts the routing prefix from a request path, used both by the table
/// and by the rate limiter (which buckets by prefix before routing).
///
/// `/api/games/123` yields `("games", "/games/123")`; a path without a
/// prefix segment yields `None`.
pub fn split_prefix(path: &str) -> Option<(&str, String)> {
    let trimmed = path.trim_start_matches('/');
    let rest = trimmed.strip_prefix("api/").unwrap_or(trimmed);
    let prefix = rest.split('/').next().filter(|s| !s.is_empty())?;
    Some((prefix, format!("/{}", rest)))
}
