//! Gateway error taxonomy and the canonical wire envelope.
//!
//! Every pipeline stage surfaces failures as a [`GatewayError`]; the proxy
//! handler converts them into the [`ErrorEnvelope`] wire format exactly once.
//! Internal messages never reach the client; each variant maps to a fixed,
//! operator-safe description, and the detailed cause goes to the log together
//! with the request id.

use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use serde::Serialize;
use serde_json::Value;

/// Typed failures produced by the request pipeline.
///
/// The variant determines both the HTTP status and the `error` enum string in
/// the wire envelope. Fields carry operator-facing context for logging; they
/// are never serialized to the client.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("request validation failed: {message}")]
    Validation { message: String },

    #[error("authentication rejected")]
    Unauthorized,

    #[error("access denied")]
    Forbidden,

    #[error("rate limit of {limit} exhausted for bucket {bucket}, resets at {reset_epoch_ms}")]
    RateLimited {
        bucket: String,
        limit: u32,
        reset_epoch_ms: u64,
    },

    #[error("no route matches path: {path}")]
    RouteNotFound { path: String },

    #[error("invalid upstream response from {service}: {message}")]
    BadGateway { service: String, message: String },

    #[error("service {service} is unavailable: {message}")]
    ServiceUnavailable { service: String, message: String },

    #[error("upstream {service} did not respond within {timeout_ms}ms")]
    Timeout { service: String, timeout_ms: u64 },

    #[error("internal gateway error: {message}")]
    Internal { message: String },
}

impl GatewayError {
    /// The `error` enum string used in the wire envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Validation { .. } => "VALIDATION_ERROR",
            GatewayError::Unauthorized => "UNAUTHORIZED",
            GatewayError::Forbidden => "FORBIDDEN",
            GatewayError::RateLimited { .. } => "RATE_LIMIT_EXCEEDED",
            GatewayError::RouteNotFound { .. } => "ROUTE_NOT_FOUND",
            GatewayError::BadGateway { .. } => "BAD_GATEWAY",
            GatewayError::ServiceUnavailable { .. } => "SERVICE_UNAVAILABLE",
            GatewayError::Timeout { .. } => "PROXY_TIMEOUT",
            GatewayError::Internal { .. } => "INTERNAL_SERVER_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Validation { .. } => StatusCode::BAD_REQUEST,
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::Forbidden => StatusCode::FORBIDDEN,
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::BadGateway { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Fixed client-facing description. Identical inputs must yield identical
    /// error shapes, so nothing variant-specific leaks into this string.
    pub fn client_message(&self) -> &'static str {
        match self {
            GatewayError::Validation { .. } => "The request could not be validated",
            GatewayError::Unauthorized => "Invalid or missing credentials",
            GatewayError::Forbidden => "Access denied",
            GatewayError::RateLimited { .. } => "Too many requests. Please try again later.",
            GatewayError::RouteNotFound { .. } => "No route matches the requested path",
            GatewayError::BadGateway { .. } => "Invalid response from upstream service",
            GatewayError::ServiceUnavailable { .. } => "Service temporarily unavailable",
            GatewayError::Timeout { .. } => "Upstream service did not respond in time",
            GatewayError::Internal { .. } => "An unexpected error occurred",
        }
    }

    /// Logical name of the upstream involved, when the failure is
    /// attributable to one.
    pub fn service(&self) -> Option<&str> {
        match self {
            GatewayError::BadGateway { service, .. }
            | GatewayError::ServiceUnavailable { service, .. }
            | GatewayError::Timeout { service, .. } => Some(service),
            _ => None,
        }
    }
}

/// Canonical error wire format.
///
/// Produced exclusively by [`GatewayError::to_response`]; handlers never
/// build ad-hoc error bodies.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub error: String,
    pub message: String,
    pub status_code: u16,
    pub timestamp: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorEnvelope {
    pub fn from_error(err: &GatewayError, path: &str, request_id: &str) -> Self {
        Self {
            error: err.kind().to_string(),
            message: err.client_message().to_string(),
            status_code: err.status().as_u16(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            path: path.to_string(),
            service: err.service().map(str::to_string),
            request_id: request_id.to_string(),
            details: None,
        }
    }
}

impl GatewayError {
    /// Normalizes the error into the wire response, logging the operator
    /// detail under the request id.
    pub fn to_response(&self, path: &str, request_id: &str) -> HttpResponse {
        log::warn!("[{}] {} {}: {}", request_id, self.kind(), path, self);

        let envelope = ErrorEnvelope::from_error(self, path, request_id);
        HttpResponse::build(self.status()).json(envelope)
    }
}

// Escape hatch for errors that surface outside the proxy pipeline (payload
// limits, extractor failures). The envelope gets a fresh request id because
// no request context is available here.
impl actix_web::error::ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        self.status()
    }

    fn error_response(&self) -> HttpResponse {
        let request_id = uuid::Uuid::new_v4().to_string();
        self.to_response("", &request_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_match_statuses() {
        let cases: Vec<(GatewayError, &str, u16)> = vec![
            (
                GatewayError::Validation { message: "bad".into() },
                "VALIDATION_ERROR",
                400,
            ),
            (GatewayError::Unauthorized, "UNAUTHORIZED", 401),
            (GatewayError::Forbidden, "FORBIDDEN", 403),
            (
                GatewayError::RateLimited { bucket: "b".into(), limit: 10, reset_epoch_ms: 0 },
                "RATE_LIMIT_EXCEEDED",
                429,
            ),
            (
                GatewayError::RouteNotFound { path: "/x".into() },
                "ROUTE_NOT_FOUND",
                404,
            ),
            (
                GatewayError::BadGateway { service: "s".into(), message: "m".into() },
                "BAD_GATEWAY",
                502,
            ),
            (
                GatewayError::ServiceUnavailable { service: "s".into(), message: "m".into() },
                "SERVICE_UNAVAILABLE",
                503,
            ),
            (
                GatewayError::Timeout { service: "s".into(), timeout_ms: 2000 },
                "PROXY_TIMEOUT",
                504,
            ),
            (
                GatewayError::Internal { message: "m".into() },
                "INTERNAL_SERVER_ERROR",
                500,
            ),
        ];

        for (err, kind, status) in cases {
            assert_eq!(err.kind(), kind);
            assert_eq!(err.status().as_u16(), status);
        }
    }

    #[test]
    fn envelope_carries_request_context() {
        let err = GatewayError::RouteNotFound { path: "/api/unknown".into() };
        let envelope = ErrorEnvelope::from_error(&err, "/api/unknown", "req-1");

        assert_eq!(envelope.error, "ROUTE_NOT_FOUND");
        assert_eq!(envelope.status_code, 404);
        assert_eq!(envelope.path, "/api/unknown");
        assert_eq!(envelope.request_id, "req-1");
        assert!(envelope.service.is_none());
    }

    #[test]
    fn envelope_never_leaks_internal_detail() {
        let err = GatewayError::ServiceUnavailable {
            service: "payment-service".into(),
            message: "connection refused (10.0.3.17:8080)".into(),
        };
        let envelope = ErrorEnvelope::from_error(&err, "/api/payments/checkout", "req-2");

        assert_eq!(envelope.message, "Service temporarily unavailable");
        assert!(!envelope.message.contains("10.0.3.17"));
        assert_eq!(envelope.service.as_deref(), Some("payment-service"));
    }

    #[test]
    fn envelope_serializes_wire_field_names() {
        let err = GatewayError::Unauthorized;
        let envelope = ErrorEnvelope::from_error(&err, "/api/users/profile", "req-3");
        let json = serde_json::to_value(&envelope).unwrap();

        assert_eq!(json["error"], "UNAUTHORIZED");
        assert_eq!(json["statusCode"], 401);
        assert_eq!(json["requestId"], "req-3");
        assert!(json.get("service").is_none());
        assert!(json.get("details").is_none());
    }
}
