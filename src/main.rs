//! Janus API Gateway Server
//!
//! Binary entry point: loads and validates configuration, connects the
//! shared store, wires the pipeline explicitly, and runs the HTTP server
//! with graceful shutdown.

use janus_rs::config::settings::load_settings;
use janus_rs::config::validation::ConfigValidator;
use janus_rs::logs::logger::configure_logger;
use janus_rs::middleware::cors::Cors;
use janus_rs::middleware::request_id::CorrelationId;
use janus_rs::middleware::security::security_headers;
use janus_rs::models::settings::Settings;
use janus_rs::routes::{health, http as proxy, metrics};
use janus_rs::services::auth::Authenticator;
use janus_rs::services::cache::ResponseCache;
use janus_rs::services::http::GatewayHandler;
use janus_rs::services::rate_limiter::RateLimiter;
use janus_rs::services::registry::ServiceRegistry;
use janus_rs::services::store::{MemoryStore, RedisStore, SharedStore};
use janus_rs::utils::clock::{Clock, SystemClock};
use janus_rs::utils::route_table::RouteTable;

use actix_web::{middleware::Logger, web, App, HttpServer};
use log::{error, info, warn};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    configure_logger();

    let settings: Settings = match load_settings() {
        Ok(settings) => settings,
        Err(e) => {
            error!("failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("starting janus-rs API gateway v{}", env!("CARGO_PKG_VERSION"));

    let validation = ConfigValidator::validate_comprehensive(&settings);
    if !validation.is_valid {
        error!("configuration validation failed:");
        for err in &validation.errors {
            error!("  - {}", err);
        }
        std::process::exit(1);
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let store: Arc<dyn SharedStore> = if settings.redis.enabled {
        let op_timeout = Duration::from_millis(settings.redis.op_timeout_ms);
        match RedisStore::connect(&settings.redis.url, &settings.redis.key_prefix, op_timeout)
            .await
        {
            Ok(store) => {
                info!("connected to shared store");
                Arc::new(store)
            }
            Err(e) => {
                error!("cannot reach shared store at startup: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        warn!("shared store disabled, using in-process store");
        Arc::new(MemoryStore::new(clock.clone()))
    };

    let client = Client::builder()
        .pool_idle_timeout(Duration::from_secs(30))
        .pool_max_idle_per_host(32)
        .build()
        .expect("failed to create HTTP client");

    let registry = Arc::new(ServiceRegistry::new(
        settings.services.clone(),
        client.clone(),
        PROBE_TIMEOUT,
    ));

    let descriptors = registry.descriptors();
    let route_table = match RouteTable::new(&settings.routes, &descriptors) {
        Ok(table) => Arc::new(table),
        Err(e) => {
            error!("failed to build routing table: {}", e);
            std::process::exit(1);
        }
    };

    let rate_limiter = match RateLimiter::new(store.clone(), clock.clone(), &settings.rate_limit) {
        Ok(limiter) => Arc::new(limiter),
        Err(e) => {
            error!("failed to compile rate limit tiers: {}", e);
            std::process::exit(1);
        }
    };

    let user_service = match registry.get("user-service") {
        Some(service) => service,
        None => {
            error!("user-service descriptor missing from registry");
            std::process::exit(1);
        }
    };
    let authenticator = Arc::new(Authenticator::new(client.clone(), user_service));

    let cache = Arc::new(ResponseCache::new(store.clone(), &settings.cache));

    let handler = GatewayHandler::new(
        client,
        &registry,
        route_table,
        rate_limiter,
        authenticator,
        cache,
        settings.breaker.clone(),
        clock,
        settings.trust_proxy,
    );

    let metrics_collector = metrics::MetricsCollector::default();

    let host = settings.host.clone();
    let port = settings.port;
    let cors_settings = settings.cors.clone();
    let max_body_bytes = settings.max_body_bytes;

    info!(
        "listening on {}:{} with {} routes across {} services",
        host,
        port,
        settings.routes.len(),
        registry.len()
    );

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(metrics_collector.clone()))
            .app_data(web::Data::new(registry.clone()))
            .app_data(web::Data::new(handler.clone()))
            .app_data(web::Data::from(store.clone()))
            .wrap(Logger::new(r#"%a "%r" %s %b "%{User-Agent}i" %T"#))
            .wrap(Cors::new(cors_settings.clone()))
            .wrap(security_headers())
            .wrap(CorrelationId)
            .configure(health::configure_health)
            .configure(metrics::configure_metrics)
            .configure(|cfg| proxy::configure_proxy(cfg, handler.clone(), max_body_bytes))
    })
    .bind((host.as_str(), port))?
    .run();

    tokio::select! {
        result = server => {
            match result {
                Ok(_) => info!("server stopped gracefully"),
                Err(e) => error!("server error: {}", e),
            }
        }
        _ = signal::ctrl_c() => {
            info!("received shutdown signal, stopping server");
        }
    }

    Ok(())
}
