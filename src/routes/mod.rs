//! HTTP route handlers and endpoint definitions.
//!
//! # Module Organization
//!
//! - [`health`] - Liveness, per-service probes, readiness
//! - [`metrics`] - Prometheus text endpoint and request counters
//! - [`http`] - The catch-all `/api/*` proxy resource
//!
//! Operational endpoints respond from the gateway itself; everything under
//! `/api/` flows through the [`crate::services::http::GatewayHandler`]
//! pipeline.

pub mod health;
pub mod http;
pub mod metrics;
