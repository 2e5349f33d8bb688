//! # Janus-rs API Gateway
//!
//! An async HTTP API gateway built with Rust and Actix Web. Janus-rs fronts
//! the platform's microservice fleet: it authenticates requests, enforces
//! per-client rate limits, routes by URL prefix, caches idempotent reads,
//! shields upstreams with circuit breakers and bounded retries, and
//! normalizes every failure into one canonical error envelope.
//!
//! ## Request pipeline
//!
//! ```text
//! ┌────────┐  ┌──────────────────────────────────────────┐  ┌───────────┐
//! │ Client │─▶│ entry (request id, security, CORS)       │  │ Upstream  │
//! └────────┘  │  ├─ rate limiter (shared store)          │─▶│ services  │
//!             │  ├─ authenticator (user service)         │  └───────────┘
//!             │  ├─ router (prefix table)                │
//!             │  ├─ response cache (GET only)            │
//!             │  ├─ forwarder (breaker, retry, timeout)  │
//!             │  └─ normalizer (error envelope)          │
//!             └──────────────────────────────────────────┘
//! ```
//!
//! Stage order within a request is strict: rate-limit, auth, route, cache
//! lookup, forward, cache store, normalize. Each stage returns
//! `Result<_, GatewayError>`; no panics cross stage boundaries.
//!
//! ## Failure policy
//!
//! The shared store is best-effort: the rate limiter fails open and the
//! cache degrades to pass-through, so a store outage never becomes a
//! platform outage. Upstream failures are isolated per service by the
//! circuit breaker; mutating requests are never retried.
//!
//! ## Module Organization
//!
//! - [`config`] - Environment configuration loading and boot validation
//! - [`models`] - Domain types, errors, and the wire envelope
//! - [`services`] - The data plane: store, limiter, auth, cache, breaker,
//!   registry, forwarder
//! - [`routes`] - HTTP endpoints (proxy resource, health, metrics)
//! - [`middleware`] - Entry-layer middleware (request id, security, CORS)
//! - [`utils`] - Route table, URL helpers, clock abstraction
//! - [`logs`] - Logger setup
//!
//! ## Environment
//!
//! - `JANUS_HOST` / `PORT`: bind address (default `0.0.0.0:8080`)
//! - `REDIS_URL`, `REDIS_ENABLED`, `REDIS_KEY_PREFIX`: shared store
//! - `SERVICE_<NAME>_BASE_URL` (+ `_TIMEOUT_MS`, `_RETRIES`,
//!   `_HEALTH_PATH`): upstream fleet
//! - `RATE_LIMIT_*`, `CACHE_*`, `CORS_*`, `BREAKER_*`: policy knobs
//! - `NO_COLOR`: disable colored log output

pub mod config;
pub mod logs;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;
