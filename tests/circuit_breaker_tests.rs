use janus_rs::models::service::CircuitBreakerSettings;
use janus_rs::services::circuit_breaker::{Admission, CircuitBreaker, CircuitState};
use janus_rs::utils::clock::ManualClock;
use std::sync::Arc;

fn breaker(
    failure_threshold: u32,
    reset_timeout_ms: u64,
    monitoring_period_ms: u64,
) -> (Arc<ManualClock>, Arc<CircuitBreaker>) {
    let clock = Arc::new(ManualClock::new(10_000_000));
    let settings = CircuitBreakerSettings {
        failure_threshold,
        reset_timeout_ms,
        monitoring_period_ms,
    };
    let cb = CircuitBreaker::new("payment-service".to_string(), settings, clock.clone());
    (clock, cb)
}

#[test]
fn starts_closed_and_admits() {
    let (_, cb) = breaker(3, 30_000, 60_000);
    assert_eq!(cb.state(), CircuitState::Closed);
    assert_eq!(cb.admit(), Admission::Allowed { trial: false });
}

#[test]
fn three_failures_open_the_circuit() {
    let (_, cb) = breaker(3, 30_000, 60_000);

    cb.record_failure();
    cb.record_failure();
    assert_eq!(cb.state(), CircuitState::Closed);
    assert_eq!(cb.failure_count(), 2);

    cb.record_failure();
    assert_eq!(cb.state(), CircuitState::Open);
}

#[test]
fn open_circuit_short_circuits_until_reset_timeout() {
    let (clock, cb) = breaker(3, 30_000, 60_000);
    for _ in 0..3 {
        cb.record_failure();
    }

    // Within the reset window every admission is rejected.
    clock.advance(29_999);
    assert!(matches!(cb.admit(), Admission::Rejected { .. }));

    // One tick past the window the breaker goes half-open and admits the
    // single trial.
    clock.advance(2);
    assert_eq!(cb.admit(), Admission::Allowed { trial: true });
    assert_eq!(cb.state(), CircuitState::HalfOpen);
}

#[test]
fn trial_success_returns_to_closed_with_reset_counters() {
    let (clock, cb) = breaker(3, 30_000, 60_000);
    for _ in 0..3 {
        cb.record_failure();
    }
    clock.advance(30_001);

    assert_eq!(cb.admit(), Admission::Allowed { trial: true });
    cb.record_success();

    assert_eq!(cb.state(), CircuitState::Closed);
    assert_eq!(cb.failure_count(), 0);
}

#[test]
fn concurrent_requests_after_reset_admit_exactly_one_trial() {
    let (clock, cb) = breaker(1, 30_000, 60_000);
    cb.record_failure();
    clock.advance(30_001);

    // Simulate N requests racing through the gate from worker threads.
    let mut handles = Vec::new();
    for _ in 0..16 {
        let cb = cb.clone();
        handles.push(std::thread::spawn(move || cb.admit()));
    }

    let admissions: Vec<Admission> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let trials = admissions
        .iter()
        .filter(|a| matches!(a, Admission::Allowed { trial: true }))
        .count();
    let rejections = admissions
        .iter()
        .filter(|a| matches!(a, Admission::Rejected { .. }))
        .count();

    assert_eq!(trials, 1, "exactly one trial must be admitted");
    assert_eq!(rejections, 15, "everyone else sees open semantics");
}

#[test]
fn success_in_closed_state_clears_accumulated_failures() {
    let (_, cb) = breaker(3, 30_000, 60_000);

    cb.record_failure();
    cb.record_failure();
    cb.record_success();
    assert_eq!(cb.failure_count(), 0);

    // The count restarts, so two more failures still do not trip it.
    cb.record_failure();
    cb.record_failure();
    assert_eq!(cb.state(), CircuitState::Closed);
}

#[test]
fn monitoring_period_expiry_resets_before_recording() {
    let (clock, cb) = breaker(2, 30_000, 5_000);

    cb.record_failure();
    clock.advance(5_001);

    // The first failure aged out of the monitoring window, so this one
    // starts a fresh count instead of tripping the breaker.
    cb.record_failure();
    assert_eq!(cb.state(), CircuitState::Closed);
    assert_eq!(cb.failure_count(), 1);
}
