//! Read-only registry of upstream service descriptors with health probing.

use crate::models::service::ServiceDescriptor;
use crate::utils::path::compose_upstream_url;
use ahash::HashMap as AHashMap;
use futures::future::join_all;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// One probe result for the `/health/services` report.
#[derive(Serialize, Debug, Clone)]
pub struct ServiceHealth {
    pub service: String,
    pub status: HealthStatus,
    pub response_time_ms: u64,
    pub last_check: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Service descriptors, built once from configuration at startup.
pub struct ServiceRegistry {
    services: AHashMap<String, Arc<ServiceDescriptor>>,
    client: Client,
    probe_timeout: Duration,
}

impl ServiceRegistry {
    pub fn new(services: Vec<ServiceDescriptor>, client: Client, probe_timeout: Duration) -> Self {
        let services = services
            .into_iter()
            .map(|s| (s.name.clone(), Arc::new(s)))
            .collect();
        Self {
            services,
            client,
            probe_timeout,
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<ServiceDescriptor>> {
        self.services.get(name).map(Arc::clone)
    }

    pub fn descriptors(&self) -> Vec<Arc<ServiceDescriptor>> {
        self.services.values().map(Arc::clone).collect()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Bounded health-check call against one service.
    pub async fn probe(&self, service: &ServiceDescriptor) -> ServiceHealth {
        let url = compose_upstream_url(&service.base_url, &service.health_path);
        let started = Instant::now();

        let outcome = self
            .client
            .get(&url)
            .timeout(self.probe_timeout)
            .send()
            .await;

        let response_time_ms = started.elapsed().as_millis() as u64;
        let last_check = chrono::Utc::now().to_rfc3339();

        match outcome {
            Ok(response) if response.status().is_success() => ServiceHealth {
                service: service.name.clone(),
                status: HealthStatus::Healthy,
                response_time_ms,
                last_check,
                error: None,
            },
            Ok(response) => ServiceHealth {
                service: service.name.clone(),
                status: HealthStatus::Unhealthy,
                response_time_ms,
                last_check,
                error: Some(format!("health check returned {}", response.status())),
            },
            Err(e) => ServiceHealth {
                service: service.name.clone(),
                status: HealthStatus::Unhealthy,
                response_time_ms,
                last_check,
                error: Some(e.to_string()),
            },
        }
    }

    /// Probes every registered service concurrently.
    pub async fn probe_all(&self) -> Vec<ServiceHealth> {
        let probes = self
            .services
            .values()
            .map(|service| self.probe(service))
            .collect::<Vec<_>>();
        let mut report = join_all(probes).await;
        report.sort_by(|a, b| a.service.cmp(&b.service));
        report
    }
}
