//! Boot-time configuration validation with detailed error reporting.
//!
//! Invalid configuration must abort startup; warnings and recommendations
//! are logged but do not block boot.

use crate::models::settings::Settings;
use log::{info, warn};
use regex::Regex;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_error(&mut self, error: String) {
        self.is_valid = false;
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate_comprehensive(settings: &Settings) -> ValidationResult {
        let mut result = ValidationResult::new();

        Self::validate_server(settings, &mut result);
        Self::validate_services(settings, &mut result);
        Self::validate_routes(settings, &mut result);
        Self::validate_rate_limit(settings, &mut result);
        Self::validate_cache_and_store(settings, &mut result);
        Self::validate_breaker(settings, &mut result);

        Self::log_results(&result);
        result
    }

    fn validate_server(settings: &Settings, result: &mut ValidationResult) {
        if settings.port == 0 {
            result.add_error("PORT must be between 1 and 65535".to_string());
        }
        if settings.max_body_bytes == 0 {
            result.add_error("MAX_BODY_BYTES must be greater than 0".to_string());
        }
        if settings.max_body_bytes > 64 * 1024 * 1024 {
            result.add_warning(format!(
                "MAX_BODY_BYTES is very large ({} bytes); large uploads hold worker memory",
                settings.max_body_bytes
            ));
        }
    }

    fn validate_services(settings: &Settings, result: &mut ValidationResult) {
        if settings.services.is_empty() {
            result.add_error(
                "no services configured, the gateway would route nothing".to_string(),
            );
        }

        let mut seen = HashSet::new();
        for service in &settings.services {
            if let Err(e) = service.validate() {
                result.add_error(e);
            }
            if !seen.insert(service.name.as_str()) {
                result.add_error(format!("duplicate service name: {}", service.name));
            }
            if service.base_url.starts_with("http://")
                && !service.base_url.contains("localhost")
                && !service.base_url.contains("127.0.0.1")
            {
                result.add_warning(format!(
                    "service {} uses plain HTTP ({})",
                    service.name, service.base_url
                ));
            }
        }

        if settings.service("user-service").is_none() {
            result.add_error(
                "user-service must be configured, token validation depends on it".to_string(),
            );
        }
    }

    fn validate_routes(settings: &Settings, result: &mut ValidationResult) {
        if settings.routes.is_empty() {
            result.add_error("no routes configured".to_string());
        }

        let mut seen = HashSet::new();
        for route in &settings.routes {
            if let Err(e) = route.validate() {
                result.add_error(e);
            }
            if !seen.insert(route.prefix.as_str()) {
                result.add_error(format!("duplicate route prefix: {}", route.prefix));
            }
            if settings.service(&route.service).is_none() {
                result.add_error(format!(
                    "route '{}' references unknown service '{}'",
                    route.prefix, route.service
                ));
            }
        }
    }

    fn validate_rate_limit(settings: &Settings, result: &mut ValidationResult) {
        let rl = &settings.rate_limit;
        if rl.window_ms == 0 {
            result.add_error("RATE_LIMIT_WINDOW_MS must be greater than 0".to_string());
        }
        if rl.max_requests == 0 {
            result.add_error("RATE_LIMIT_MAX_REQUESTS must be at least 1".to_string());
        }
        for tier in &rl.tiers {
            if tier.max_requests == 0 || tier.window_ms == 0 {
                result.add_error(format!(
                    "rate limit tier '{}' must have positive budget and window",
                    tier.pattern
                ));
            }
            if let Err(e) = Regex::new(&tier.pattern) {
                result.add_error(format!(
                    "rate limit tier pattern '{}' does not compile: {}",
                    tier.pattern, e
                ));
            }
        }
        if !rl.enabled {
            result.add_warning("rate limiting is disabled".to_string());
        }
    }

    fn validate_cache_and_store(settings: &Settings, result: &mut ValidationResult) {
        if settings.cache.ttl_ms == 0 {
            result.add_error("CACHE_TTL_MS must be greater than 0".to_string());
        }
        if settings.redis.op_timeout_ms == 0 {
            result.add_error("REDIS_OP_TIMEOUT_MS must be greater than 0".to_string());
        }
        if !settings.redis.enabled {
            result.add_warning(
                "shared store disabled; rate limits and cache are per-instance only".to_string(),
            );
        } else if !settings.redis.url.starts_with("redis://")
            && !settings.redis.url.starts_with("rediss://")
        {
            result.add_error(format!(
                "REDIS_URL must start with redis:// or rediss://, got '{}'",
                settings.redis.url
            ));
        }
    }

    fn validate_breaker(settings: &Settings, result: &mut ValidationResult) {
        if let Err(e) = settings.breaker.validate() {
            result.add_error(format!("breaker defaults: {}", e));
        }
    }

    fn log_results(result: &ValidationResult) {
        if result.is_valid {
            info!("configuration validation passed");
        } else {
            for error in &result.errors {
                log::error!("validation error: {}", error);
            }
        }
        for warning in &result.warnings {
            warn!("validation warning: {}", warning);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::load_settings;
    use crate::models::route::RouteEntry;

    #[test]
    fn default_configuration_is_valid() {
        let settings = load_settings().unwrap();
        let result = ConfigValidator::validate_comprehensive(&settings);
        assert!(result.is_valid, "errors: {:?}", result.errors);
    }

    #[test]
    fn zero_port_is_rejected() {
        let mut settings = load_settings().unwrap();
        settings.port = 0;
        let result = ConfigValidator::validate_comprehensive(&settings);
        assert!(!result.is_valid);
        assert!(result.errors.iter().any(|e| e.contains("PORT")));
    }

    #[test]
    fn route_to_unknown_service_is_rejected() {
        let mut settings = load_settings().unwrap();
        settings.routes.push(RouteEntry {
            prefix: "ghost".to_string(),
            service: "ghost-service".to_string(),
            auth: None,
            cache: false,
        });
        let result = ConfigValidator::validate_comprehensive(&settings);
        assert!(!result.is_valid);
        assert!(result
            .errors
            .iter()
            .any(|e| e.contains("unknown service 'ghost-service'")));
    }

    #[test]
    fn duplicate_prefixes_are_rejected() {
        let mut settings = load_settings().unwrap();
        let duplicate = settings.routes[0].clone();
        settings.routes.push(duplicate);
        let result = ConfigValidator::validate_comprehensive(&settings);
        assert!(!result.is_valid);
        assert!(result.errors.iter().any(|e| e.contains("duplicate route prefix")));
    }

    #[test]
    fn missing_user_service_is_rejected() {
        let mut settings = load_settings().unwrap();
        settings.services.retain(|s| s.name != "user-service");
        settings.routes.retain(|r| r.service != "user-service");
        let result = ConfigValidator::validate_comprehensive(&settings);
        assert!(!result.is_valid);
        assert!(result.errors.iter().any(|e| e.contains("user-service")));
    }

    #[test]
    fn zero_cache_ttl_is_rejected() {
        let mut settings = load_settings().unwrap();
        settings.cache.ttl_ms = 0;
        let result = ConfigValidator::validate_comprehensive(&settings);
        assert!(!result.is_valid);
    }

    #[test]
    fn sub_second_breaker_reset_is_rejected() {
        let mut settings = load_settings().unwrap();
        settings.breaker.reset_timeout_ms = 200;
        let result = ConfigValidator::validate_comprehensive(&settings);
        assert!(!result.is_valid);
    }
}
