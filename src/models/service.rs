//! Upstream service descriptors and circuit-breaker parameters.
//!
//! A [`ServiceDescriptor`] is built once from configuration at startup and is
//! read-only afterwards. All timing fields are millisecond values so they can
//! be loaded straight from environment variables and validated with plain
//! range checks.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Circuit breaker parameters for one upstream service.
///
/// A service trips to open after `failure_threshold` breaker-worthy failures
/// inside one `monitoring_period_ms` window, stays open for
/// `reset_timeout_ms`, then admits a single trial request.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerSettings {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    #[serde(default = "default_reset_timeout_ms")]
    pub reset_timeout_ms: u64,

    #[serde(default = "default_monitoring_period_ms")]
    pub monitoring_period_ms: u64,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_reset_timeout_ms() -> u64 {
    30_000
}

fn default_monitoring_period_ms() -> u64 {
    60_000
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            reset_timeout_ms: default_reset_timeout_ms(),
            monitoring_period_ms: default_monitoring_period_ms(),
        }
    }
}

impl CircuitBreakerSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold == 0 {
            return Err("failure_threshold must be at least 1".to_string());
        }
        if self.reset_timeout_ms < 1_000 {
            return Err("reset_timeout_ms must be at least 1000".to_string());
        }
        if self.monitoring_period_ms < 1_000 {
            return Err("monitoring_period_ms must be at least 1000".to_string());
        }
        Ok(())
    }
}

/// Static description of one upstream microservice.
///
/// # Examples
///
/// ```json
/// {
///   "name": "game-catalog-service",
///   "base_url": "http://game-catalog-service:8080",
///   "timeout_ms": 5000,
///   "max_retries": 2,
///   "health_path": "/health"
/// }
/// ```
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ServiceDescriptor {
    /// Logical name, used as the breaker key and in the error envelope.
    pub name: String,

    /// Absolute base URL including scheme, without a trailing path.
    pub base_url: String,

    /// Per-request deadline; the retry budget is bounded by this value.
    pub timeout_ms: u64,

    /// Maximum retry attempts for safe-read requests (0 disables retries).
    pub max_retries: u32,

    /// Health probe path, always starting with `/`.
    pub health_path: String,

    /// Breaker parameters; `None` means the global defaults apply.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breaker: Option<CircuitBreakerSettings>,
}

impl ServiceDescriptor {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("service name must not be empty".to_string());
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(format!(
                "service {} base_url must start with http:// or https://",
                self.name
            ));
        }
        if self.timeout_ms < 100 {
            return Err(format!(
                "service {} timeout_ms must be at least 100",
                self.name
            ));
        }
        if !self.health_path.starts_with('/') {
            return Err(format!(
                "service {} health_path must start with '/'",
                self.name
            ));
        }
        if let Some(breaker) = &self.breaker {
            breaker
                .validate()
                .map_err(|e| format!("service {}: {}", self.name, e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> ServiceDescriptor {
        ServiceDescriptor {
            name: "user-service".to_string(),
            base_url: "http://user-service:8080".to_string(),
            timeout_ms: 5_000,
            max_retries: 2,
            health_path: "/health".to_string(),
            breaker: None,
        }
    }

    #[test]
    fn valid_descriptor_passes() {
        assert!(descriptor().validate().is_ok());
    }

    #[test]
    fn rejects_relative_base_url() {
        let mut d = descriptor();
        d.base_url = "user-service:8080".to_string();
        assert!(d.validate().is_err());
    }

    #[test]
    fn rejects_sub_minimum_timeout() {
        let mut d = descriptor();
        d.timeout_ms = 99;
        assert!(d.validate().is_err());
    }

    #[test]
    fn rejects_health_path_without_slash() {
        let mut d = descriptor();
        d.health_path = "health".to_string();
        assert!(d.validate().is_err());
    }

    #[test]
    fn breaker_settings_ranges() {
        assert!(CircuitBreakerSettings::default().validate().is_ok());

        let zero_threshold = CircuitBreakerSettings {
            failure_threshold: 0,
            ..Default::default()
        };
        assert!(zero_threshold.validate().is_err());

        let short_reset = CircuitBreakerSettings {
            reset_timeout_ms: 500,
            ..Default::default()
        };
        assert!(short_reset.validate().is_err());
    }
}
