//! Environment-driven configuration loading.
//!
//! The gateway is configured entirely from environment variables so it can
//! boot in containers without a config file. Parse failures are hard errors:
//! a value that is present but malformed aborts startup rather than silently
//! falling back to a default.

use crate::models::route::{AuthPolicy, RouteEntry};
use crate::models::service::{CircuitBreakerSettings, ServiceDescriptor};
use crate::models::settings::{
    default_tiers, CacheSettings, CorsSettings, RateLimitSettings, RedisSettings, Settings,
};
use log::debug;
use std::fmt::Display;
use std::str::FromStr;

/// Known upstreams: `(logical name, env var infix)`.
const KNOWN_SERVICES: &[(&str, &str)] = &[
    ("user-service", "USER"),
    ("game-catalog-service", "GAME_CATALOG"),
    ("payment-service", "PAYMENT"),
    ("library-service", "LIBRARY"),
    ("social-service", "SOCIAL"),
    ("review-service", "REVIEW"),
    ("achievement-service", "ACHIEVEMENT"),
    ("notification-service", "NOTIFICATION"),
    ("download-service", "DOWNLOAD"),
    ("security-service", "SECURITY"),
];

/// Routing table: `(prefix, service, auth override, cache opt-in)`.
const DEFAULT_ROUTES: &[(&str, &str, Option<AuthPolicy>, bool)] = &[
    ("users", "user-service", None, false),
    ("games", "game-catalog-service", None, true),
    ("payments", "payment-service", None, false),
    ("library", "library-service", None, false),
    ("social", "social-service", None, false),
    ("reviews", "review-service", None, true),
    ("achievements", "achievement-service", None, false),
    ("notifications", "notification-service", None, false),
    ("downloads", "download-service", None, false),
    ("security", "security-service", None, false),
    // Login and token refresh must be reachable without a token.
    ("auth", "user-service", Some(AuthPolicy::None), false),
];

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> Result<T, String>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| format!("invalid value for {}: {}", key, e)),
        Err(_) => Ok(default),
    }
}

fn env_bool(key: &str, default: bool) -> Result<bool, String> {
    match std::env::var(key) {
        Ok(raw) => match raw.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => Err(format!("invalid boolean for {}: '{}'", key, other)),
        },
        Err(_) => Ok(default),
    }
}

fn load_service(
    name: &str,
    infix: &str,
    default_timeout_ms: u64,
    default_retries: u32,
) -> Result<ServiceDescriptor, String> {
    let base_url = env_string(
        &format!("SERVICE_{}_BASE_URL", infix),
        &format!("http://{}:8080", name),
    );
    let timeout_ms = env_parse(&format!("SERVICE_{}_TIMEOUT_MS", infix), default_timeout_ms)?;
    let max_retries = env_parse(&format!("SERVICE_{}_RETRIES", infix), default_retries)?;
    let health_path = env_string(&format!("SERVICE_{}_HEALTH_PATH", infix), "/health");

    Ok(ServiceDescriptor {
        name: name.to_string(),
        base_url,
        timeout_ms,
        max_retries,
        health_path,
        breaker: None,
    })
}

/// Builds the full [`Settings`] from the environment.
///
/// Callers must still run
/// [`crate::config::validation::ConfigValidator::validate_comprehensive`]
/// before using the result; this function only parses.
pub fn load_settings() -> Result<Settings, Box<dyn std::error::Error>> {
    let host = env_string("JANUS_HOST", "0.0.0.0");
    let port: u16 = env_parse("PORT", 8080)?;
    let trust_proxy = env_bool("TRUST_PROXY", true)?;
    let max_body_bytes: usize = env_parse("MAX_BODY_BYTES", 1024 * 1024)?;

    let default_timeout_ms: u64 = env_parse("SERVICE_DEFAULT_TIMEOUT_MS", 5_000)?;
    let default_retries: u32 = env_parse("SERVICE_DEFAULT_RETRIES", 2)?;

    let services = KNOWN_SERVICES
        .iter()
        .map(|(name, infix)| load_service(name, infix, default_timeout_ms, default_retries))
        .collect::<Result<Vec<_>, _>>()?;

    let routes = DEFAULT_ROUTES
        .iter()
        .map(|(prefix, service, auth, cache)| RouteEntry {
            prefix: (*prefix).to_string(),
            service: (*service).to_string(),
            auth: *auth,
            cache: *cache,
        })
        .collect();

    let redis = RedisSettings {
        enabled: env_bool("REDIS_ENABLED", true)?,
        url: env_string("REDIS_URL", "redis://127.0.0.1:6379"),
        key_prefix: env_string("REDIS_KEY_PREFIX", "janus:"),
        op_timeout_ms: env_parse("REDIS_OP_TIMEOUT_MS", 500)?,
    };

    let rate_limit = RateLimitSettings {
        enabled: env_bool("RATE_LIMIT_ENABLED", true)?,
        window_ms: env_parse("RATE_LIMIT_WINDOW_MS", 60_000)?,
        max_requests: env_parse("RATE_LIMIT_MAX_REQUESTS", 100)?,
        tiers: default_tiers(),
    };

    let cache = CacheSettings {
        enabled: env_bool("CACHE_ENABLED", true)?,
        ttl_ms: env_parse("CACHE_TTL_MS", 30_000)?,
    };

    let cors = CorsSettings {
        origin: env_string("CORS_ORIGIN", "*"),
        methods: env_string("CORS_METHODS", "GET, POST, PUT, PATCH, DELETE, OPTIONS"),
        headers: env_string(
            "CORS_HEADERS",
            "Content-Type, Authorization, X-Request-Id",
        ),
        credentials: env_bool("CORS_CREDENTIALS", false)?,
    };

    let breaker = CircuitBreakerSettings {
        failure_threshold: env_parse("BREAKER_FAILURE_THRESHOLD", 5)?,
        reset_timeout_ms: env_parse("BREAKER_RESET_TIMEOUT_MS", 30_000)?,
        monitoring_period_ms: env_parse("BREAKER_MONITORING_PERIOD_MS", 60_000)?,
    };

    let settings = Settings {
        host,
        port,
        trust_proxy,
        max_body_bytes,
        redis,
        services,
        routes,
        rate_limit,
        cache,
        cors,
        breaker,
    };

    debug!(
        "loaded configuration: {} services, {} routes",
        settings.services.len(),
        settings.routes.len()
    );

    Ok(settings)
}
