//! The request pipeline and upstream forwarder.
//!
//! [`GatewayHandler`] composes the data-plane stages in strict order:
//! rate limit, authentication, routing, cache lookup, forwarding with retry
//! and circuit breaking, cache store, normalization. Each stage returns
//! `Result<_, GatewayError>`; the handler is the single place where errors
//! become wire responses, and every proxied response leaves with the
//! `X-RateLimit-*` headers attached.

use crate::models::auth::AuthenticatedUser;
use crate::models::error::GatewayError;
use crate::models::route::MethodClass;
use crate::models::service::CircuitBreakerSettings;
use crate::routes::metrics::MetricsCollector;
use crate::services::auth::{bearer_credential, Authenticator};
use crate::services::cache::{CacheLookup, CachedResponse, ResponseCache};
use crate::services::circuit_breaker::{Admission, CircuitBreaker, CircuitState};
use crate::services::rate_limiter::{bucket_key, client_ip, RateLimitDecision, RateLimiter};
use crate::services::registry::ServiceRegistry;
use crate::utils::clock::Clock;
use crate::utils::path::compose_upstream_url;
use crate::utils::route_table::{split_prefix, RouteMatch, RouteMatchError, RouteTable};

use actix_web::http::header::{HeaderName, HeaderValue};
use actix_web::http::StatusCode;
use actix_web::{web, HttpMessage, HttpRequest, HttpResponse};
use ahash::HashMap as AHashMap;
use log::{debug, warn};
use once_cell::sync::Lazy;
use rand::Rng;
use reqwest::header::{
    HeaderMap as UpstreamHeaderMap, HeaderName as UpstreamHeaderName,
    HeaderValue as UpstreamHeaderValue,
};
use reqwest::{Client, Method as UpstreamMethod};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// Headers valid only for a single transport connection, plus `Host` and
/// `Content-Length` which the forwarder regenerates.
static HOP_BY_HOP: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "connection",
        "keep-alive",
        "proxy-authenticate",
        "proxy-authorization",
        "te",
        "trailer",
        "transfer-encoding",
        "upgrade",
        "host",
        "content-length",
    ]
    .into_iter()
    .collect()
});

pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.contains(name)
}

const HEADER_CACHE: &str = "x-cache";

/// A fully captured upstream response, filtered down to end-to-end headers.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: web::Bytes,
}

/// The gateway data plane. Cheap to clone and safe to share across workers;
/// all mutable state (breakers, pools) sits behind `Arc`s.
#[derive(Clone)]
pub struct GatewayHandler {
    client: Client,
    route_table: Arc<RouteTable>,
    rate_limiter: Arc<RateLimiter>,
    authenticator: Arc<Authenticator>,
    cache: Arc<ResponseCache>,
    breakers: Arc<AHashMap<String, Arc<CircuitBreaker>>>,
    trust_proxy: bool,
}

impl GatewayHandler {
    /// Wires the pipeline together. One circuit breaker is created per
    /// registered service, using the service's own parameters when present
    /// and the global defaults otherwise.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: Client,
        registry: &ServiceRegistry,
        route_table: Arc<RouteTable>,
        rate_limiter: Arc<RateLimiter>,
        authenticator: Arc<Authenticator>,
        cache: Arc<ResponseCache>,
        breaker_defaults: CircuitBreakerSettings,
        clock: Arc<dyn Clock>,
        trust_proxy: bool,
    ) -> Self {
        let mut breakers = AHashMap::default();
        for service in registry.descriptors() {
            let settings = service
                .breaker
                .clone()
                .unwrap_or_else(|| breaker_defaults.clone());
            breakers.insert(
                service.name.clone(),
                CircuitBreaker::new(service.name.clone(), settings, clock.clone()),
            );
        }

        Self {
            client,
            route_table,
            rate_limiter,
            authenticator,
            cache,
            breakers: Arc::new(breakers),
            trust_proxy,
        }
    }

    /// Entry point for the proxy resource. Never fails: pipeline errors are
    /// normalized into the wire envelope here.
    pub async fn handle(&self, req: HttpRequest, body: web::Bytes) -> HttpResponse {
        let started = Instant::now();
        let path = req.path().to_string();
        let request_id = request_id_of(&req);

        let metrics = req.app_data::<web::Data<MetricsCollector>>().cloned();
        if let Some(metrics) = &metrics {
            metrics.increment_connections();
        }

        let mut rate_decision = None;
        let mut response = match self.process(&req, body, &mut rate_decision).await {
            Ok(response) => response,
            Err(err) => err.to_response(&path, &request_id),
        };

        if let Some(decision) = &rate_decision {
            apply_rate_limit_headers(&mut response, decision);
        }

        if let Some(metrics) = &metrics {
            let status = response.status();
            metrics.record_request(status.is_success(), started.elapsed(), status.as_u16());
            if status == StatusCode::TOO_MANY_REQUESTS {
                metrics.record_rate_limited();
            }
            if let Some(marker) = response
                .headers()
                .get(HEADER_CACHE)
                .and_then(|v| v.to_str().ok())
            {
                metrics.record_cache(marker);
            }
            metrics.decrement_connections();
        }

        response
    }

    /// Runs the staged pipeline. The rate-limit decision is handed back to
    /// the caller regardless of outcome so its headers reach every response.
    async fn process(
        &self,
        req: &HttpRequest,
        body: web::Bytes,
        rate_decision: &mut Option<RateLimitDecision>,
    ) -> Result<HttpResponse, GatewayError> {
        let method = req.method().clone();
        let path = req.path();

        // Admission control runs before routing; the bucket prefix comes
        // straight from the path so unroutable requests are limited too.
        let prefix = split_prefix(path)
            .map(|(prefix, _)| prefix.to_string())
            .unwrap_or_default();
        let ip = client_ip(req, self.trust_proxy);
        let decision = self.rate_limiter.check(&ip, method.as_str(), &prefix).await;
        let (allowed, limit, reset_epoch_ms) =
            (decision.allowed, decision.limit, decision.reset_epoch_ms);
        *rate_decision = Some(decision);
        if !allowed {
            return Err(GatewayError::RateLimited {
                bucket: bucket_key(&ip, method.as_str(), &prefix),
                limit,
                reset_epoch_ms,
            });
        }

        let route = self
            .route_table
            .resolve(&method, path)
            .map_err(route_error)?;

        let auth_header = req
            .headers()
            .get(actix_web::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        let user = self
            .authenticator
            .authenticate(auth_header, route.auth)
            .await?;

        let cacheable = self.cache.enabled()
            && route.cache_enabled
            && route.method_class == MethodClass::SafeRead
            && method.as_str() == "GET";
        let fingerprint = cacheable.then(|| {
            let credential = auth_header.and_then(bearer_credential);
            ResponseCache::fingerprint(method.as_str(), path, req.query_string(), credential)
        });

        let mut cache_marker = None;
        if let Some(fingerprint) = &fingerprint {
            match self.cache.lookup(fingerprint).await {
                CacheLookup::Hit(entry) => return Ok(render_cached(entry)),
                CacheLookup::Miss => cache_marker = Some("MISS"),
                CacheLookup::Error => cache_marker = Some("ERROR"),
            }
        }

        let upstream = self.forward(req, &route, &body, user.as_ref()).await?;

        if let (Some(fingerprint), Some("MISS")) = (&fingerprint, cache_marker) {
            if (200..300).contains(&upstream.status) {
                let entry = CachedResponse {
                    status: upstream.status,
                    headers: upstream.headers.clone(),
                    body: upstream.body.to_vec(),
                };
                if !self.cache.store_response(fingerprint, &entry).await {
                    cache_marker = Some("ERROR");
                }
            }
        }

        Ok(render_upstream(upstream, cache_marker))
    }

    /// Forwards one request with breaker gating, per-attempt timeouts, and
    /// bounded exponential-backoff retries. A request produces exactly one
    /// breaker event no matter how many attempts it made.
    async fn forward(
        &self,
        req: &HttpRequest,
        route: &RouteMatch,
        body: &web::Bytes,
        user: Option<&AuthenticatedUser>,
    ) -> Result<UpstreamResponse, GatewayError> {
        let service = &route.service;
        let breaker = self
            .breakers
            .get(&service.name)
            .ok_or_else(|| GatewayError::Internal {
                message: format!("no circuit breaker registered for {}", service.name),
            })?;

        match breaker.admit() {
            Admission::Rejected { retry_after_ms } => {
                debug!(
                    "circuit open for {}, short-circuiting ({}ms until trial)",
                    service.name, retry_after_ms
                );
                return Err(GatewayError::ServiceUnavailable {
                    service: service.name.clone(),
                    message: "circuit breaker open".to_string(),
                });
            }
            Admission::Allowed { trial } => {
                if trial {
                    debug!("admitting recovery trial to {}", service.name);
                }
            }
        }

        let mut url = compose_upstream_url(&service.base_url, &route.remainder);
        let query = req.query_string();
        if !query.is_empty() {
            url.push('?');
            url.push_str(query);
        }

        let headers = self.sanitize_headers(req, user);
        let method = upstream_method(req.method());
        let timeout_ms = service.timeout_ms;
        let deadline = Instant::now() + service.timeout();
        let max_attempts = match route.method_class {
            MethodClass::SafeRead => service.max_retries + 1,
            MethodClass::Mutating => 1,
        };

        let mut attempt = 0;
        let failure = loop {
            attempt += 1;

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break GatewayError::Timeout {
                    service: service.name.clone(),
                    timeout_ms,
                };
            }

            let request = self
                .client
                .request(method.clone(), &url)
                .headers(headers.clone())
                .body(body.to_vec());

            match tokio::time::timeout(remaining, request.send()).await {
                Err(_) => {
                    // The overall deadline is spent; no further attempts.
                    break GatewayError::Timeout {
                        service: service.name.clone(),
                        timeout_ms,
                    };
                }
                Ok(Err(e)) => {
                    warn!(
                        "transport error contacting {} (attempt {}/{}): {}",
                        service.name, attempt, max_attempts, e
                    );
                    if attempt < max_attempts {
                        backoff(attempt, deadline).await;
                        continue;
                    }
                    break GatewayError::ServiceUnavailable {
                        service: service.name.clone(),
                        message: e.to_string(),
                    };
                }
                Ok(Ok(response)) => {
                    let status = response.status().as_u16();
                    if (500..=599).contains(&status) && attempt < max_attempts {
                        warn!(
                            "upstream {} returned {} (attempt {}/{}), retrying",
                            service.name, status, attempt, max_attempts
                        );
                        backoff(attempt, deadline).await;
                        continue;
                    }

                    let headers = collect_headers(response.headers());
                    let body = match response.bytes().await {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            breaker.record_failure();
                            return Err(GatewayError::BadGateway {
                                service: service.name.clone(),
                                message: e.to_string(),
                            });
                        }
                    };

                    if (500..=599).contains(&status) {
                        // Forwarded unchanged, but still a breaker event.
                        breaker.record_failure();
                    } else {
                        breaker.record_success();
                    }

                    return Ok(UpstreamResponse {
                        status,
                        headers,
                        body,
                    });
                }
            }
        };

        breaker.record_failure();
        Err(failure)
    }

    /// Converts inbound headers for upstream forwarding: hop-by-hop headers
    /// and the client `Authorization` are dropped, forwarding headers are
    /// rebuilt, and the validated user identity is injected.
    fn sanitize_headers(
        &self,
        req: &HttpRequest,
        user: Option<&AuthenticatedUser>,
    ) -> UpstreamHeaderMap {
        let mut upstream = UpstreamHeaderMap::with_capacity(req.headers().len() + 4);

        for (key, value) in req.headers() {
            let name = key.as_str();
            if is_hop_by_hop(name) || name == "authorization" || name.starts_with("x-forwarded-") {
                continue;
            }
            if let (Ok(name), Ok(value)) = (
                UpstreamHeaderName::from_bytes(key.as_ref()),
                UpstreamHeaderValue::from_bytes(value.as_bytes()),
            ) {
                upstream.insert(name, value);
            }
        }

        let peer = req.peer_addr().map(|addr| addr.ip().to_string());
        let inbound_chain = req
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok());
        let forwarded_for = match (inbound_chain, peer) {
            (Some(chain), Some(peer)) => Some(format!("{}, {}", chain, peer)),
            (Some(chain), None) => Some(chain.to_string()),
            (None, Some(peer)) => Some(peer),
            (None, None) => None,
        };
        if let Some(value) = forwarded_for.and_then(|v| UpstreamHeaderValue::from_str(&v).ok()) {
            upstream.insert("x-forwarded-for", value);
        }

        let conn = req.connection_info();
        if let Ok(value) = UpstreamHeaderValue::from_str(conn.scheme()) {
            upstream.insert("x-forwarded-proto", value);
        }
        if let Ok(value) = UpstreamHeaderValue::from_str(conn.host()) {
            upstream.insert("x-forwarded-host", value);
        }
        drop(conn);

        if let Some(user) = user {
            if let Ok(value) = UpstreamHeaderValue::from_str(&user.id) {
                upstream.insert("x-user-id", value);
            }
            if let Some(email) = &user.email {
                if let Ok(value) = UpstreamHeaderValue::from_str(email) {
                    upstream.insert("x-user-email", value);
                }
            }
            if !user.roles.is_empty() {
                if let Ok(value) = UpstreamHeaderValue::from_str(&user.roles.join(",")) {
                    upstream.insert("x-user-roles", value);
                }
            }
        }

        upstream
            .entry(reqwest::header::USER_AGENT)
            .or_insert_with(|| {
                UpstreamHeaderValue::from_static(concat!("janus-rs/", env!("CARGO_PKG_VERSION")))
            });

        upstream
    }

    /// Current breaker states, surfaced by the health report.
    pub fn breaker_states(&self) -> Vec<(String, CircuitState, u32)> {
        let mut states: Vec<_> = self
            .breakers
            .values()
            .map(|b| (b.name().to_string(), b.state(), b.failure_count()))
            .collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }
}

fn route_error(err: RouteMatchError) -> GatewayError {
    match err {
        RouteMatchError::NoMatch { path } => GatewayError::RouteNotFound { path },
        RouteMatchError::UnsupportedMethod { method } => GatewayError::Validation {
            message: format!("method {} is not supported", method),
        },
        RouteMatchError::UnknownService { prefix, service } => GatewayError::Internal {
            message: format!("route {} references unknown service {}", prefix, service),
        },
    }
}

/// Sleeps `100ms * 2^(attempt-1)` plus jitter, never past the deadline.
async fn backoff(attempt: u32, deadline: Instant) {
    let base_ms = 100u64.saturating_mul(1u64 << (attempt.min(16) - 1));
    let jitter = rand::thread_rng().gen_range(0..=base_ms / 4);
    let wait = Duration::from_millis(base_ms + jitter);
    let remaining = deadline.saturating_duration_since(Instant::now());
    sleep(wait.min(remaining)).await;
}

fn upstream_method(method: &actix_web::http::Method) -> UpstreamMethod {
    match method.as_str() {
        "POST" => UpstreamMethod::POST,
        "PUT" => UpstreamMethod::PUT,
        "PATCH" => UpstreamMethod::PATCH,
        "DELETE" => UpstreamMethod::DELETE,
        "HEAD" => UpstreamMethod::HEAD,
        "OPTIONS" => UpstreamMethod::OPTIONS,
        _ => UpstreamMethod::GET,
    }
}

fn collect_headers(headers: &UpstreamHeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

fn render_upstream(upstream: UpstreamResponse, cache_marker: Option<&str>) -> HttpResponse {
    let status = StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut builder = HttpResponse::build(status);
    for (name, value) in &upstream.headers {
        builder.append_header((name.as_str(), value.as_str()));
    }
    if let Some(marker) = cache_marker {
        builder.insert_header((HEADER_CACHE, marker));
    }
    builder.body(upstream.body)
}

fn render_cached(entry: CachedResponse) -> HttpResponse {
    let status = StatusCode::from_u16(entry.status).unwrap_or(StatusCode::OK);
    let mut builder = HttpResponse::build(status);
    for (name, value) in &entry.headers {
        builder.append_header((name.as_str(), value.as_str()));
    }
    builder.insert_header((HEADER_CACHE, "HIT"));
    builder.body(entry.body)
}

fn apply_rate_limit_headers(response: &mut HttpResponse, decision: &RateLimitDecision) {
    let headers = response.headers_mut();
    let pairs = [
        ("x-ratelimit-limit", decision.limit.to_string()),
        ("x-ratelimit-remaining", decision.remaining.to_string()),
        (
            "x-ratelimit-reset",
            (decision.reset_epoch_ms / 1_000).to_string(),
        ),
    ];
    for (name, value) in pairs {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    }
}

fn request_id_of(req: &HttpRequest) -> String {
    if let Some(id) = req
        .extensions()
        .get::<crate::middleware::request_id::RequestId>()
    {
        return id.0.clone();
    }
    req.headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn hop_by_hop_set_covers_connection_headers() {
        for name in [
            "connection",
            "keep-alive",
            "proxy-authenticate",
            "proxy-authorization",
            "te",
            "trailer",
            "transfer-encoding",
            "upgrade",
            "host",
            "content-length",
        ] {
            assert!(is_hop_by_hop(name), "{} should be hop-by-hop", name);
        }
        assert!(!is_hop_by_hop("content-type"));
        assert!(!is_hop_by_hop("authorization"));
    }

    #[test]
    fn upstream_method_conversion() {
        use actix_web::http::Method;
        assert_eq!(upstream_method(&Method::GET), UpstreamMethod::GET);
        assert_eq!(upstream_method(&Method::POST), UpstreamMethod::POST);
        assert_eq!(upstream_method(&Method::DELETE), UpstreamMethod::DELETE);
        assert_eq!(upstream_method(&Method::HEAD), UpstreamMethod::HEAD);
    }

    #[test]
    fn collect_headers_drops_hop_by_hop() {
        let mut headers = UpstreamHeaderMap::new();
        headers.insert("content-type", "application/json".parse().unwrap());
        headers.insert("connection", "keep-alive".parse().unwrap());
        headers.insert("transfer-encoding", "chunked".parse().unwrap());
        headers.insert("etag", "\"v1\"".parse().unwrap());

        let collected = collect_headers(&headers);
        let names: Vec<&str> = collected.iter().map(|(n, _)| n.as_str()).collect();
        assert!(names.contains(&"content-type"));
        assert!(names.contains(&"etag"));
        assert!(!names.contains(&"connection"));
        assert!(!names.contains(&"transfer-encoding"));
    }

    #[test]
    fn rate_limit_headers_are_attached_in_seconds() {
        let decision = RateLimitDecision {
            allowed: true,
            limit: 60,
            remaining: 41,
            reset_epoch_ms: 1_700_000_123_000,
            window_ms: 60_000,
        };
        let mut response = HttpResponse::Ok().finish();
        apply_rate_limit_headers(&mut response, &decision);

        let headers = response.headers();
        assert_eq!(headers.get("x-ratelimit-limit").unwrap(), "60");
        assert_eq!(headers.get("x-ratelimit-remaining").unwrap(), "41");
        assert_eq!(headers.get("x-ratelimit-reset").unwrap(), "1700000123");
    }

    #[test]
    fn request_id_falls_back_to_inbound_header() {
        let req = TestRequest::default()
            .insert_header(("x-request-id", "abc-123"))
            .to_http_request();
        assert_eq!(request_id_of(&req), "abc-123");

        let bare = TestRequest::default().to_http_request();
        let generated = request_id_of(&bare);
        assert_eq!(generated.len(), 36);
    }

    #[test]
    fn cached_rendering_marks_hits() {
        let entry = CachedResponse {
            status: 200,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: b"{}".to_vec(),
        };
        let response = render_cached(entry);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("x-cache").unwrap(), "HIT");
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );
    }
}
