//! Application configuration model.
//!
//! Built once by [`crate::config::settings::load_settings`] from the
//! environment, validated by [`crate::config::validation::ConfigValidator`],
//! and read-only afterwards.

use crate::models::route::RouteEntry;
use crate::models::service::{CircuitBreakerSettings, ServiceDescriptor};
use serde::{Deserialize, Serialize};

/// Shared store (Redis) connection settings.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RedisSettings {
    /// When false the gateway runs on an in-process store; rate limits and
    /// the cache are then per-instance only.
    pub enabled: bool,
    pub url: String,
    /// Prefix applied to every key (`ratelimit:*`, `cache:*`).
    pub key_prefix: String,
    /// Bound for every single store round-trip.
    pub op_timeout_ms: u64,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "janus:".to_string(),
            op_timeout_ms: 500,
        }
    }
}

/// One rate-limit tier: a prefix pattern with its own budget.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TierSettings {
    /// Regex matched against the route prefix, most specific tier first.
    pub pattern: String,
    pub max_requests: u32,
    pub window_ms: u64,
}

/// Rate limiter settings: tier table plus the default bucket budget.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RateLimitSettings {
    pub enabled: bool,
    pub window_ms: u64,
    pub max_requests: u32,
    pub tiers: Vec<TierSettings>,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            window_ms: 60_000,
            max_requests: 100,
            tiers: default_tiers(),
        }
    }
}

/// Built-in per-prefix budgets; the most restrictive prefixes come first.
pub fn default_tiers() -> Vec<TierSettings> {
    [
        ("^auth$", 10),
        ("^payments$", 20),
        ("^downloads$", 50),
        ("^users$", 60),
        ("^games", 200),
    ]
    .iter()
    .map(|(pattern, max)| TierSettings {
        pattern: (*pattern).to_string(),
        max_requests: *max,
        window_ms: 60_000,
    })
    .collect()
}

/// Response cache settings.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub ttl_ms: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_ms: 30_000,
        }
    }
}

/// CORS policy applied at the entry layer.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CorsSettings {
    pub origin: String,
    pub methods: String,
    pub headers: String,
    pub credentials: bool,
}

impl Default for CorsSettings {
    fn default() -> Self {
        Self {
            origin: "*".to_string(),
            methods: "GET, POST, PUT, PATCH, DELETE, OPTIONS".to_string(),
            headers: "Content-Type, Authorization, X-Request-Id".to_string(),
            credentials: false,
        }
    }
}

/// Complete gateway configuration.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    /// Trust the first `X-Forwarded-For` entry for the client IP.
    pub trust_proxy: bool,
    pub max_body_bytes: usize,
    pub redis: RedisSettings,
    pub services: Vec<ServiceDescriptor>,
    pub routes: Vec<RouteEntry>,
    pub rate_limit: RateLimitSettings,
    pub cache: CacheSettings,
    pub cors: CorsSettings,
    /// Breaker defaults for services without their own parameters.
    pub breaker: CircuitBreakerSettings,
}

impl Settings {
    pub fn service(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.services.iter().find(|s| s.name == name)
    }
}
