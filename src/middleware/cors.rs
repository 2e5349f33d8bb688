//! CORS handling at the entry layer.
//!
//! `OPTIONS` preflight requests are answered directly with `204 No Content`
//! and the configured policy headers; the pipeline below this middleware is
//! never invoked for them. All other responses get the allow-origin headers
//! appended.

use crate::models::settings::CorsSettings;
use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderName, HeaderValue},
    Error, HttpResponse,
};
use futures_util::future::{ok, LocalBoxFuture, Ready};
use std::rc::Rc;

pub struct Cors {
    settings: Rc<CorsSettings>,
}

impl Cors {
    pub fn new(settings: CorsSettings) -> Self {
        Self {
            settings: Rc::new(settings),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for Cors
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Transform = CorsMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(CorsMiddleware {
            service: Rc::new(service),
            settings: self.settings.clone(),
        })
    }
}

pub struct CorsMiddleware<S> {
    service: Rc<S>,
    settings: Rc<CorsSettings>,
}

impl<S, B> Service<ServiceRequest> for CorsMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let settings = self.settings.clone();

        Box::pin(async move {
            if req.method() == actix_web::http::Method::OPTIONS {
                let mut response = HttpResponse::NoContent();
                response
                    .insert_header(("Access-Control-Allow-Origin", settings.origin.as_str()))
                    .insert_header(("Access-Control-Allow-Methods", settings.methods.as_str()))
                    .insert_header(("Access-Control-Allow-Headers", settings.headers.as_str()))
                    .insert_header(("Access-Control-Max-Age", "3600"));
                if settings.credentials {
                    response.insert_header(("Access-Control-Allow-Credentials", "true"));
                }
                return Ok(req.into_response(response.finish()));
            }

            let mut res = service.call(req).await?.map_into_boxed_body();
            if let Ok(value) = HeaderValue::from_str(&settings.origin) {
                res.headers_mut()
                    .insert(HeaderName::from_static("access-control-allow-origin"), value);
            }
            if settings.credentials {
                res.headers_mut().insert(
                    HeaderName::from_static("access-control-allow-credentials"),
                    HeaderValue::from_static("true"),
                );
            }
            Ok(res)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, web, App, HttpResponse};

    async fn handler() -> HttpResponse {
        HttpResponse::Ok().body("downstream")
    }

    fn settings() -> CorsSettings {
        CorsSettings {
            origin: "https://app.example.com".to_string(),
            methods: "GET, POST, OPTIONS".to_string(),
            headers: "Content-Type, Authorization".to_string(),
            credentials: true,
        }
    }

    #[actix_web::test]
    async fn preflight_short_circuits_with_204() {
        let app = test::init_service(
            App::new()
                .wrap(Cors::new(settings()))
                .route("/api/games", web::get().to(handler)),
        )
        .await;

        let req = test::TestRequest::with_uri("/api/games")
            .method(actix_web::http::Method::OPTIONS)
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), 204);
        assert_eq!(
            resp.headers().get("access-control-allow-origin").unwrap(),
            "https://app.example.com"
        );
        assert_eq!(
            resp.headers().get("access-control-allow-methods").unwrap(),
            "GET, POST, OPTIONS"
        );
        assert_eq!(
            resp.headers()
                .get("access-control-allow-credentials")
                .unwrap(),
            "true"
        );
    }

    #[actix_web::test]
    async fn regular_requests_pass_through_with_origin_header() {
        let app = test::init_service(
            App::new()
                .wrap(Cors::new(settings()))
                .route("/api/games", web::get().to(handler)),
        )
        .await;

        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri("/api/games").to_request(),
        )
        .await;

        assert_eq!(resp.status(), 200);
        assert_eq!(
            resp.headers().get("access-control-allow-origin").unwrap(),
            "https://app.example.com"
        );
        let body = test::read_body(resp).await;
        assert_eq!(body, "downstream");
    }
}
