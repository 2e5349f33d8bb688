//! Prometheus-compatible metrics endpoint.
//!
//! Counters are plain atomics shared across workers; the endpoint renders
//! them in the Prometheus text exposition format
//! (`text/plain; version=0.0.4`).

use actix_web::{web, HttpResponse, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Gateway-wide request counters.
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    pub requests_total: Arc<AtomicU64>,
    pub requests_success: Arc<AtomicU64>,
    pub requests_error: Arc<AtomicU64>,
    pub requests_4xx: Arc<AtomicU64>,
    pub requests_5xx: Arc<AtomicU64>,
    pub rate_limited_total: Arc<AtomicU64>,
    pub cache_hits: Arc<AtomicU64>,
    pub cache_misses: Arc<AtomicU64>,
    pub cache_errors: Arc<AtomicU64>,
    pub response_time_sum_ms: Arc<AtomicU64>,
    pub active_connections: Arc<AtomicU64>,
    pub start_time: Instant,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self {
            requests_total: Arc::new(AtomicU64::new(0)),
            requests_success: Arc::new(AtomicU64::new(0)),
            requests_error: Arc::new(AtomicU64::new(0)),
            requests_4xx: Arc::new(AtomicU64::new(0)),
            requests_5xx: Arc::new(AtomicU64::new(0)),
            rate_limited_total: Arc::new(AtomicU64::new(0)),
            cache_hits: Arc::new(AtomicU64::new(0)),
            cache_misses: Arc::new(AtomicU64::new(0)),
            cache_errors: Arc::new(AtomicU64::new(0)),
            response_time_sum_ms: Arc::new(AtomicU64::new(0)),
            active_connections: Arc::new(AtomicU64::new(0)),
            start_time: Instant::now(),
        }
    }
}

impl MetricsCollector {
    pub fn record_request(&self, success: bool, response_time: Duration, status: u16) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.response_time_sum_ms
            .fetch_add(response_time.as_millis() as u64, Ordering::Relaxed);

        if success {
            self.requests_success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.requests_error.fetch_add(1, Ordering::Relaxed);
        }

        match status {
            400..=499 => {
                self.requests_4xx.fetch_add(1, Ordering::Relaxed);
            }
            500..=599 => {
                self.requests_5xx.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache(&self, marker: &str) {
        match marker {
            "HIT" => {
                self.cache_hits.fetch_add(1, Ordering::Relaxed);
            }
            "MISS" => {
                self.cache_misses.fetch_add(1, Ordering::Relaxed);
            }
            "ERROR" => {
                self.cache_errors.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    pub fn increment_connections(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decrement_connections(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Prometheus text endpoint.
pub async fn metrics_endpoint(metrics: web::Data<MetricsCollector>) -> Result<HttpResponse> {
    let total = metrics.requests_total.load(Ordering::Relaxed);
    let success = metrics.requests_success.load(Ordering::Relaxed);
    let error = metrics.requests_error.load(Ordering::Relaxed);
    let status_4xx = metrics.requests_4xx.load(Ordering::Relaxed);
    let status_5xx = metrics.requests_5xx.load(Ordering::Relaxed);
    let rate_limited = metrics.rate_limited_total.load(Ordering::Relaxed);
    let cache_hits = metrics.cache_hits.load(Ordering::Relaxed);
    let cache_misses = metrics.cache_misses.load(Ordering::Relaxed);
    let cache_errors = metrics.cache_errors.load(Ordering::Relaxed);
    let response_time_sum = metrics.response_time_sum_ms.load(Ordering::Relaxed);
    let active = metrics.active_connections.load(Ordering::Relaxed);
    let uptime = metrics.start_time.elapsed().as_secs();

    let avg_response_time = if total > 0 {
        response_time_sum as f64 / total as f64
    } else {
        0.0
    };

    let body = format!(
        r#"# HELP janus_requests_total Total number of proxied HTTP requests
# TYPE janus_requests_total counter
janus_requests_total {total}

# HELP janus_requests_success_total Requests answered with a 2xx status
# TYPE janus_requests_success_total counter
janus_requests_success_total {success}

# HELP janus_requests_error_total Requests answered with a non-2xx status
# TYPE janus_requests_error_total counter
janus_requests_error_total {error}

# HELP janus_requests_4xx_total Requests answered with a 4xx status
# TYPE janus_requests_4xx_total counter
janus_requests_4xx_total {status_4xx}

# HELP janus_requests_5xx_total Requests answered with a 5xx status
# TYPE janus_requests_5xx_total counter
janus_requests_5xx_total {status_5xx}

# HELP janus_rate_limited_total Requests rejected by the rate limiter
# TYPE janus_rate_limited_total counter
janus_rate_limited_total {rate_limited}

# HELP janus_cache_hits_total Responses served from the cache
# TYPE janus_cache_hits_total counter
janus_cache_hits_total {cache_hits}

# HELP janus_cache_misses_total Cache lookups that missed
# TYPE janus_cache_misses_total counter
janus_cache_misses_total {cache_misses}

# HELP janus_cache_errors_total Cache operations degraded by store errors
# TYPE janus_cache_errors_total counter
janus_cache_errors_total {cache_errors}

# HELP janus_response_time_avg_ms Average response time in milliseconds
# TYPE janus_response_time_avg_ms gauge
janus_response_time_avg_ms {avg_response_time:.2}

# HELP janus_active_connections Requests currently in flight
# TYPE janus_active_connections gauge
janus_active_connections {active}

# HELP janus_uptime_seconds Gateway uptime in seconds
# TYPE janus_uptime_seconds counter
janus_uptime_seconds {uptime}
"#
    );

    Ok(HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4; charset=utf-8")
        .body(body))
}

pub fn configure_metrics(cfg: &mut web::ServiceConfig) {
    cfg.route("/metrics", web::get().to(metrics_endpoint));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = MetricsCollector::default();
        metrics.record_request(true, Duration::from_millis(20), 200);
        metrics.record_request(false, Duration::from_millis(40), 503);
        metrics.record_request(false, Duration::from_millis(10), 429);
        metrics.record_rate_limited();
        metrics.record_cache("HIT");
        metrics.record_cache("MISS");
        metrics.record_cache("MISS");

        assert_eq!(metrics.requests_total.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.requests_success.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.requests_error.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.requests_4xx.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.requests_5xx.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.rate_limited_total.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.cache_hits.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.cache_misses.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.response_time_sum_ms.load(Ordering::Relaxed), 70);
    }

    #[test]
    fn connection_gauge_tracks_in_flight() {
        let metrics = MetricsCollector::default();
        metrics.increment_connections();
        metrics.increment_connections();
        metrics.decrement_connections();
        assert_eq!(metrics.active_connections.load(Ordering::Relaxed), 1);
    }
}
