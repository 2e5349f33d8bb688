use actix_web::http::Method;
use janus_rs::config::settings::load_settings;
use janus_rs::models::route::{AuthPolicy, MethodClass};
use janus_rs::models::service::ServiceDescriptor;
use janus_rs::utils::route_table::{RouteMatchError, RouteTable};
use std::sync::Arc;

/// Builds the production routing table from the default configuration.
fn production_table() -> RouteTable {
    let settings = load_settings().unwrap();
    let services: Vec<Arc<ServiceDescriptor>> = settings
        .services
        .iter()
        .cloned()
        .map(Arc::new)
        .collect();
    RouteTable::new(&settings.routes, &services).unwrap()
}

#[test]
fn every_platform_prefix_resolves_to_its_service() {
    let table = production_table();
    let expected = [
        ("users", "user-service"),
        ("games", "game-catalog-service"),
        ("payments", "payment-service"),
        ("library", "library-service"),
        ("social", "social-service"),
        ("reviews", "review-service"),
        ("achievements", "achievement-service"),
        ("notifications", "notification-service"),
        ("downloads", "download-service"),
        ("security", "security-service"),
        ("auth", "user-service"),
    ];

    for (prefix, service) in expected {
        let path = format!("/api/{}/anything", prefix);
        let m = table.resolve(&Method::GET, &path).unwrap();
        assert_eq!(m.service.name, service, "prefix {} misrouted", prefix);
        assert_eq!(m.prefix, prefix);
    }
}

#[test]
fn remainder_strips_only_the_gateway_api_segment() {
    let table = production_table();

    let m = table.resolve(&Method::GET, "/api/games/123/reviews").unwrap();
    assert_eq!(m.remainder, "/games/123/reviews");

    let short = table.resolve(&Method::GET, "/api/games").unwrap();
    assert_eq!(short.remainder, "/games");
}

#[test]
fn unknown_prefixes_are_not_found() {
    let table = production_table();
    for path in ["/api/store/items", "/api/admin", "/favicon.ico"] {
        let err = table.resolve(&Method::GET, path).unwrap_err();
        assert!(
            matches!(err, RouteMatchError::NoMatch { .. }),
            "path {} should not route",
            path
        );
    }
}

#[test]
fn method_class_drives_default_auth_policy() {
    let table = production_table();

    let read = table.resolve(&Method::GET, "/api/library/mine").unwrap();
    assert_eq!(read.method_class, MethodClass::SafeRead);
    assert_eq!(read.auth, AuthPolicy::Optional);

    let write = table.resolve(&Method::DELETE, "/api/library/mine/3").unwrap();
    assert_eq!(write.method_class, MethodClass::Mutating);
    assert_eq!(write.auth, AuthPolicy::Required);
}

#[test]
fn auth_prefix_is_public_by_override() {
    let table = production_table();
    let login = table.resolve(&Method::POST, "/api/auth/login").unwrap();
    assert_eq!(login.auth, AuthPolicy::None);
    assert_eq!(login.service.name, "user-service");
}

#[test]
fn resolution_is_deterministic_across_calls() {
    let table = production_table();
    for _ in 0..3 {
        let m = table.resolve(&Method::GET, "/api/reviews/9").unwrap();
        assert_eq!(m.service.name, "review-service");
        assert!(m.cache_enabled);
    }
}
