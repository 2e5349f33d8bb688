//! Health and readiness endpoints.
//!
//! `/health` answers from the gateway alone; `/health/services` probes every
//! registered upstream concurrently and includes the breaker state;
//! `/health/readiness` additionally checks the shared store. The aggregate
//! status stays `ok` as long as the gateway itself is functional; unhealthy
//! upstreams are reported, not escalated.

use crate::services::circuit_breaker::CircuitState;
use crate::services::http::GatewayHandler;
use crate::services::registry::ServiceRegistry;
use crate::services::store::SharedStore;
use actix_web::{web, HttpResponse, Result};
use serde_json::json;
use std::sync::Arc;

/// Gateway liveness.
pub async fn health_check() -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}

/// Per-service probe report with circuit breaker states.
pub async fn services_health(
    registry: web::Data<Arc<ServiceRegistry>>,
    handler: web::Data<GatewayHandler>,
) -> Result<HttpResponse> {
    let report = registry.probe_all().await;

    let breakers: Vec<_> = handler
        .breaker_states()
        .into_iter()
        .map(|(service, state, failures)| {
            let state = match state {
                CircuitState::Closed => "closed",
                CircuitState::Open => "open",
                CircuitState::HalfOpen => "half_open",
            };
            json!({ "service": service, "state": state, "failures": failures })
        })
        .collect();

    Ok(HttpResponse::Ok().json(json!({
        "status": "ok",
        "services": report,
        "circuits": breakers,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}

/// Startup and dependency checks; 503 while the shared store is unreachable.
pub async fn readiness_check(store: web::Data<dyn SharedStore>) -> Result<HttpResponse> {
    match store.ping().await {
        Ok(()) => Ok(HttpResponse::Ok().json(json!({
            "status": "ready",
            "checks": { "store": "ok" },
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }))),
        Err(e) => {
            log::warn!("readiness check failed: {}", e);
            Ok(HttpResponse::ServiceUnavailable().json(json!({
                "status": "not_ready",
                "checks": { "store": "unreachable" },
                "timestamp": chrono::Utc::now().to_rfc3339(),
            })))
        }
    }
}

pub fn configure_health(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/health/services", web::get().to(services_health))
        .route("/health/readiness", web::get().to(readiness_check));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::store::{BrokenStore, MemoryStore};
    use crate::utils::clock::SystemClock;
    use actix_web::{test, App};

    #[actix_web::test]
    async fn liveness_reports_ok() {
        let app = test::init_service(
            App::new().route("/health", web::get().to(health_check)),
        )
        .await;

        let resp =
            test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(resp.status(), 200);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "ok");
        assert!(body["version"].is_string());
    }

    #[actix_web::test]
    async fn readiness_follows_store_health() {
        let healthy: Arc<dyn SharedStore> = Arc::new(MemoryStore::new(Arc::new(SystemClock)));
        let app = test::init_service(
            App::new()
                .app_data(web::Data::from(healthy))
                .route("/health/readiness", web::get().to(readiness_check)),
        )
        .await;
        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri("/health/readiness").to_request(),
        )
        .await;
        assert_eq!(resp.status(), 200);

        let broken: Arc<dyn SharedStore> = Arc::new(BrokenStore);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::from(broken))
                .route("/health/readiness", web::get().to(readiness_check)),
        )
        .await;
        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri("/health/readiness").to_request(),
        )
        .await;
        assert_eq!(resp.status(), 503);
    }
}
