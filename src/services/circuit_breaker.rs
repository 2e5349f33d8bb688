//! Circuit breaker protecting one upstream service.
//!
//! State lives in a small record behind a per-service mutex. The gate is
//! consulted once per request before the upstream call; accounting happens
//! once per request after retries conclude, so a request counts as a single
//! breaker event regardless of how many attempts it made.

use crate::models::service::CircuitBreakerSettings;
use crate::utils::clock::Clock;
use log::{info, warn};
use std::sync::{Arc, Mutex, PoisonError};

/// Breaker state.
///
/// * `Closed` - normal operation, requests pass through
/// * `Open` - failing fast, no upstream calls
/// * `HalfOpen` - a single trial request probes recovery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Outcome of the pre-call gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Request may proceed; `trial` marks the single half-open probe.
    Allowed { trial: bool },
    /// Circuit is open; fail fast without contacting the upstream.
    Rejected { retry_after_ms: u64 },
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failures: u32,
    first_failure_at_ms: Option<u64>,
    opened_at_ms: u64,
    trial_in_flight: bool,
}

/// Per-service circuit breaker.
///
/// Failures are counted inside a rolling monitoring period; reaching the
/// threshold opens the circuit. After the reset timeout exactly one trial is
/// admitted; concurrent requests during the trial see open semantics. A
/// single successful trial closes the circuit and resets all counters.
pub struct CircuitBreaker {
    name: String,
    settings: CircuitBreakerSettings,
    clock: Arc<dyn Clock>,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: String, settings: CircuitBreakerSettings, clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self {
            name,
            settings,
            clock,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failures: 0,
                first_failure_at_ms: None,
                opened_at_ms: 0,
                trial_in_flight: false,
            }),
        })
    }

    /// Pre-call gate. The `Open -> HalfOpen` transition happens here, under
    /// the lock, so only one caller can win the trial slot.
    pub fn admit(&self) -> Admission {
        let now = self.clock.now_ms();
        let mut inner = self.lock();

        match inner.state {
            CircuitState::Closed => Admission::Allowed { trial: false },
            CircuitState::Open => {
                let elapsed = now.saturating_sub(inner.opened_at_ms);
                if elapsed >= self.settings.reset_timeout_ms {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = true;
                    info!("circuit breaker {} half-open, admitting trial", self.name);
                    Admission::Allowed { trial: true }
                } else {
                    Admission::Rejected {
                        retry_after_ms: self.settings.reset_timeout_ms - elapsed,
                    }
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    Admission::Rejected {
                        retry_after_ms: self.settings.reset_timeout_ms,
                    }
                } else {
                    inner.trial_in_flight = true;
                    Admission::Allowed { trial: true }
                }
            }
        }
    }

    /// Records a successful request (2xx or a non-retriable 4xx). Closes the
    /// circuit from any state and resets all counters.
    pub fn record_success(&self) {
        let mut inner = self.lock();
        if inner.state != CircuitState::Closed {
            info!("circuit breaker {} closed, service recovered", self.name);
        }
        inner.state = CircuitState::Closed;
        inner.failures = 0;
        inner.first_failure_at_ms = None;
        inner.trial_in_flight = false;
    }

    /// Records a breaker-worthy failure (transport error, timeout, or 5xx
    /// after retries were exhausted).
    pub fn record_failure(&self) {
        let now = self.clock.now_ms();
        let mut inner = self.lock();

        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at_ms = now;
                inner.trial_in_flight = false;
                inner.failures = 0;
                inner.first_failure_at_ms = None;
                warn!("circuit breaker {} reopened, trial failed", self.name);
            }
            CircuitState::Open => {}
            CircuitState::Closed => {
                // Failures outside the monitoring period restart the count.
                if let Some(first) = inner.first_failure_at_ms {
                    if now.saturating_sub(first) > self.settings.monitoring_period_ms {
                        inner.failures = 0;
                        inner.first_failure_at_ms = None;
                    }
                }
                if inner.first_failure_at_ms.is_none() {
                    inner.first_failure_at_ms = Some(now);
                }
                inner.failures += 1;

                if inner.failures >= self.settings.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at_ms = now;
                    warn!(
                        "circuit breaker {} opened after {} failures",
                        self.name, inner.failures
                    );
                }
            }
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failures
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
