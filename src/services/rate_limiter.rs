//! Sliding-log rate limiter backed by the shared store.
//!
//! Buckets are keyed by `(client ip, method, route prefix)`; each bucket
//! holds the timestamps of recent requests so the window accounting is exact.
//! Store failures never reject traffic: the limiter fails open with the
//! configured limit values so a store outage cannot become a platform outage.

use crate::models::settings::RateLimitSettings;
use crate::services::store::SharedStore;
use crate::utils::clock::Clock;
use actix_web::HttpRequest;
use log::{debug, warn};
use regex::Regex;
use std::sync::Arc;

/// Admission decision plus everything needed for the `X-RateLimit-*`
/// headers.
#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_epoch_ms: u64,
    pub window_ms: u64,
}

/// One compiled tier of the limit table.
#[derive(Debug, Clone)]
pub struct RateTier {
    pub pattern: String,
    pub max_requests: u32,
    pub window_ms: u64,
    regex: Regex,
}

impl RateTier {
    pub fn new(pattern: &str, max_requests: u32, window_ms: u64) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: pattern.to_string(),
            max_requests,
            window_ms,
            regex: Regex::new(pattern)?,
        })
    }

    pub fn matches(&self, prefix: &str) -> bool {
        self.regex.is_match(prefix)
    }
}

/// Distributed sliding-log rate limiter.
pub struct RateLimiter {
    store: Arc<dyn SharedStore>,
    clock: Arc<dyn Clock>,
    tiers: Vec<RateTier>,
    default_max: u32,
    default_window_ms: u64,
    enabled: bool,
}

impl RateLimiter {
    pub fn new(
        store: Arc<dyn SharedStore>,
        clock: Arc<dyn Clock>,
        settings: &RateLimitSettings,
    ) -> Result<Self, regex::Error> {
        let tiers = settings
            .tiers
            .iter()
            .map(|t| RateTier::new(&t.pattern, t.max_requests, t.window_ms))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            store,
            clock,
            tiers,
            default_max: settings.max_requests,
            default_window_ms: settings.window_ms,
            enabled: settings.enabled,
        })
    }

    /// Budget for a route prefix: the first matching tier wins, otherwise
    /// the configured default applies.
    pub fn tier_for(&self, prefix: &str) -> (u32, u64) {
        for tier in &self.tiers {
            if tier.matches(prefix) {
                debug!(
                    "prefix {} matched tier {} with limit {}",
                    prefix, tier.pattern, tier.max_requests
                );
                return (tier.max_requests, tier.window_ms);
            }
        }
        (self.default_max, self.default_window_ms)
    }

    /// Runs the sliding-log admission check for one request.
    ///
    /// Eviction and the size read execute as one atomic store group; the
    /// insert is a second group and only happens for admitted requests.
    pub async fn check(&self, client_ip: &str, method: &str, prefix: &str) -> RateLimitDecision {
        let (limit, window_ms) = self.tier_for(prefix);
        let now = self.clock.now_ms();

        if !self.enabled {
            return RateLimitDecision {
                allowed: true,
                limit,
                remaining: limit,
                reset_epoch_ms: now + window_ms,
                window_ms,
            };
        }

        let key = bucket_key(client_ip, method, prefix);

        let snapshot = match self.store.window_snapshot(&key, now, window_ms).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("rate limit lookup failed ({}), failing open", e);
                return RateLimitDecision {
                    allowed: true,
                    limit,
                    remaining: limit,
                    reset_epoch_ms: now + window_ms,
                    window_ms,
                };
            }
        };

        if snapshot.count >= u64::from(limit) {
            let reset_epoch_ms = snapshot.oldest_ms.unwrap_or(now) + window_ms;
            return RateLimitDecision {
                allowed: false,
                limit,
                remaining: 0,
                reset_epoch_ms,
                window_ms,
            };
        }

        if let Err(e) = self.store.window_record(&key, now, window_ms).await {
            warn!("rate limit record failed ({}), request still admitted", e);
        }

        RateLimitDecision {
            allowed: true,
            limit,
            remaining: limit - (snapshot.count as u32 + 1),
            reset_epoch_ms: now + window_ms,
            window_ms,
        }
    }
}

pub fn bucket_key(client_ip: &str, method: &str, prefix: &str) -> String {
    format!("ratelimit:{}:{}:{}", client_ip, method, prefix)
}

/// Client address for bucketing: the first `X-Forwarded-For` entry when the
/// gateway trusts its fronting proxy, otherwise the transport peer.
pub fn client_ip(req: &HttpRequest, trust_proxy: bool) -> String {
    if trust_proxy {
        if let Some(forwarded) = req
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
        {
            let forwarded = forwarded.trim();
            if !forwarded.is_empty() {
                return forwarded.to_string();
            }
        }
    }

    req.peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
