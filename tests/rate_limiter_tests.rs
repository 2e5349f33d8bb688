use janus_rs::models::settings::{default_tiers, RateLimitSettings, TierSettings};
use janus_rs::services::rate_limiter::RateLimiter;
use janus_rs::services::store::{BrokenStore, MemoryStore, SharedStore};
use janus_rs::utils::clock::{Clock, ManualClock};
use std::sync::Arc;

const EPOCH: u64 = 1_700_000_000_000;

fn limiter(store: Arc<dyn SharedStore>, clock: Arc<ManualClock>) -> RateLimiter {
    let settings = RateLimitSettings {
        enabled: true,
        window_ms: 60_000,
        max_requests: 100,
        tiers: default_tiers(),
    };
    RateLimiter::new(store, clock, &settings).unwrap()
}

#[tokio::test]
async fn login_bucket_admits_ten_then_rejects_the_eleventh() {
    let clock = Arc::new(ManualClock::new(EPOCH));
    let store = Arc::new(MemoryStore::new(clock.clone()));
    let limiter = limiter(store, clock.clone());

    for i in 1..=10 {
        let decision = limiter.check("1.2.3.4", "POST", "auth").await;
        assert!(decision.allowed, "login {} of 10 should pass", i);
        clock.advance(50);
    }

    let eleventh = limiter.check("1.2.3.4", "POST", "auth").await;
    assert!(!eleventh.allowed);
    assert_eq!(eleventh.limit, 10);
    assert_eq!(eleventh.remaining, 0);
    // The window resets when the oldest logged login ages out, which is at
    // least one second away.
    assert!(eleventh.reset_epoch_ms >= clock.now_ms() + 1_000);
    assert_eq!(eleventh.reset_epoch_ms, EPOCH + 60_000);
}

#[tokio::test]
async fn exact_limit_boundary() {
    let clock = Arc::new(ManualClock::new(EPOCH));
    let store = Arc::new(MemoryStore::new(clock.clone()));
    let settings = RateLimitSettings {
        enabled: true,
        window_ms: 10_000,
        max_requests: 3,
        tiers: Vec::new(),
    };
    let limiter = RateLimiter::new(store, clock.clone(), &settings).unwrap();

    assert!(limiter.check("ip", "GET", "library").await.allowed);
    assert!(limiter.check("ip", "GET", "library").await.allowed);
    let third = limiter.check("ip", "GET", "library").await;
    assert!(third.allowed);
    assert_eq!(third.remaining, 0);

    assert!(!limiter.check("ip", "GET", "library").await.allowed);
}

#[tokio::test]
async fn budget_returns_as_the_window_slides() {
    let clock = Arc::new(ManualClock::new(EPOCH));
    let store = Arc::new(MemoryStore::new(clock.clone()));
    let settings = RateLimitSettings {
        enabled: true,
        window_ms: 1_000,
        max_requests: 2,
        tiers: Vec::new(),
    };
    let limiter = RateLimiter::new(store, clock.clone(), &settings).unwrap();

    assert!(limiter.check("ip", "GET", "social").await.allowed);
    clock.advance(600);
    assert!(limiter.check("ip", "GET", "social").await.allowed);
    assert!(!limiter.check("ip", "GET", "social").await.allowed);

    // 500ms later the first request has left the window.
    clock.advance(500);
    assert!(limiter.check("ip", "GET", "social").await.allowed);
}

#[tokio::test]
async fn custom_tier_overrides_take_precedence() {
    let clock = Arc::new(ManualClock::new(EPOCH));
    let store = Arc::new(MemoryStore::new(clock.clone()));
    let settings = RateLimitSettings {
        enabled: true,
        window_ms: 60_000,
        max_requests: 100,
        tiers: vec![TierSettings {
            pattern: "^beta-".to_string(),
            max_requests: 1,
            window_ms: 60_000,
        }],
    };
    let limiter = RateLimiter::new(store, clock, &settings).unwrap();

    assert_eq!(limiter.tier_for("beta-games"), (1, 60_000));
    assert_eq!(limiter.tier_for("games"), (100, 60_000));
}

#[tokio::test]
async fn store_outage_fails_open_with_configured_values() {
    let clock = Arc::new(ManualClock::new(EPOCH));
    let limiter = limiter(Arc::new(BrokenStore), clock);

    for _ in 0..25 {
        let decision = limiter.check("1.2.3.4", "POST", "auth").await;
        assert!(decision.allowed, "store outages must not reject traffic");
        assert_eq!(decision.limit, 10);
        assert_eq!(decision.remaining, 10);
    }
}
