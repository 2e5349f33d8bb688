//! Proxy resource wiring.

use crate::services::http::GatewayHandler;
use actix_web::{web, HttpRequest};

/// Mounts the catch-all proxy resource under `/api/` with the configured
/// payload ceiling. Operational endpoints are registered separately and are
/// never proxied.
pub fn configure_proxy(
    cfg: &mut web::ServiceConfig,
    handler: GatewayHandler,
    max_body_bytes: usize,
) {
    cfg.app_data(web::PayloadConfig::new(max_body_bytes)).service(
        web::resource("/api/{tail:.*}").to(move |req: HttpRequest, body: web::Bytes| {
            let handler = handler.clone();
            async move { handler.handle(req, body).await }
        }),
    );
}
