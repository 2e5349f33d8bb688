//! Business logic of the gateway data plane.
//!
//! # Module Organization
//!
//! - [`store`] - Shared store abstraction (Redis + in-process fallback)
//! - [`rate_limiter`] - Sliding-log admission control
//! - [`auth`] - Bearer validation by delegation to the user service
//! - [`cache`] - Fingerprint-keyed response cache
//! - [`circuit_breaker`] - Per-service failure isolation
//! - [`registry`] - Read-only service registry with health probing
//! - [`http`] - The request pipeline and upstream forwarder

pub mod auth;
pub mod cache;
pub mod circuit_breaker;
pub mod http;
pub mod rate_limiter;
pub mod registry;
pub mod store;
