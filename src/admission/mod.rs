//! Fixed-window admission control keyed by route and client.
//!
//! State is process-local. Running several instances multiplies the effective
//! limit by the instance count.

mod store;

pub use store::{MemoryRateStore, RateStore, RateWindow};

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::http::HeaderMap;

use crate::clock::{Clock, SystemClock};

/// Tracked-key count above which stale windows are swept after a hit.
pub const HOUSEKEEPING_THRESHOLD: usize = 10_000;

/// Client id used when no proxy header identifies the caller.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Trust-ordered headers: CDN first, then reverse proxy, then forwarded chain.
const CLIENT_IP_HEADERS: [&str; 2] = ["cf-connecting-ip", "x-real-ip"];
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub max_requests: u32,
}

impl RateLimitConfig {
    pub const fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
        }
    }

    /// Mutating or sensitive endpoints.
    pub const fn strict() -> Self {
        Self::new(Duration::from_secs(60), 5)
    }

    /// Ordinary mutations.
    pub const fn standard() -> Self {
        Self::new(Duration::from_secs(60), 20)
    }

    /// Read-only endpoints.
    pub const fn loose() -> Self {
        Self::new(Duration::from_secs(60), 100)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed { limit: u32, remaining: u32 },
    Denied { limit: u32, retry_after_secs: u64 },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }

    pub fn limit(&self) -> u32 {
        match *self {
            Decision::Allowed { limit, .. } | Decision::Denied { limit, .. } => limit,
        }
    }

    pub fn remaining(&self) -> u32 {
        match *self {
            Decision::Allowed { remaining, .. } => remaining,
            Decision::Denied { .. } => 0,
        }
    }
}

pub struct AdmissionController {
    store: Arc<dyn RateStore>,
    clock: Arc<dyn Clock>,
    /// When the last sweep found nothing stale. Live keys above the threshold
    /// would otherwise force a full scan on every hit.
    idle_sweep_at: Mutex<Option<Instant>>,
}

impl AdmissionController {
    pub fn new(store: Arc<dyn RateStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            idle_sweep_at: Mutex::new(None),
        }
    }

    /// Controller over a fresh in-process store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryRateStore::new()))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn check(&self, route_id: &str, client_id: &str, config: &RateLimitConfig) -> Decision {
        let now = self.clock.now();
        let key = format!("{route_id}|{client_id}");
        let decision = self.store.hit(&key, config, now);

        if self.store.len() > HOUSEKEEPING_THRESHOLD {
            self.sweep(now, config.window);
        }

        decision
    }

    fn sweep(&self, now: Instant, window: Duration) {
        // A sweep already in progress covers this hit.
        let Ok(mut idle_since) = self.idle_sweep_at.try_lock() else {
            return;
        };
        if let Some(at) = *idle_since {
            if now.saturating_duration_since(at) < window {
                return;
            }
        }

        let purged = self.store.purge_stale(now);
        *idle_since = (purged == 0).then_some(now);
        tracing::debug!(purged, tracked = self.store.len(), "swept stale rate windows");
    }

    pub fn tracked_keys(&self) -> usize {
        self.store.len()
    }
}

/// Best-effort caller identity from proxy headers.
///
/// Not authenticated: any client can forge these headers, and callers with
/// none of them share the [`UNKNOWN_CLIENT`] bucket.
pub fn client_identity(headers: &HeaderMap) -> String {
    CLIENT_IP_HEADERS
        .iter()
        .find_map(|name| header_value(headers, name))
        .or_else(|| {
            headers
                .get(FORWARDED_FOR_HEADER)
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.split(',').map(str::trim).find(|ip| !ip.is_empty()))
        })
        .unwrap_or(UNKNOWN_CLIENT)
        .to_string()
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use axum::http::HeaderValue;

    fn controller() -> (AdmissionController, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let controller = AdmissionController::in_memory().with_clock(clock.clone());
        (controller, clock)
    }

    #[test]
    fn allows_up_to_limit_then_denies() {
        let (controller, _) = controller();
        let config = RateLimitConfig::new(Duration::from_secs(60), 5);

        for i in 0..5 {
            let decision = controller.check("/api/bookings", "1.2.3.4", &config);
            assert!(decision.is_allowed(), "request {} should pass", i + 1);
            assert_eq!(decision.remaining(), 4 - i);
        }

        let denied = controller.check("/api/bookings", "1.2.3.4", &config);
        assert_eq!(
            denied,
            Decision::Denied {
                limit: 5,
                retry_after_secs: 60
            }
        );
        assert_eq!(denied.remaining(), 0);
    }

    #[test]
    fn new_window_after_expiry_even_when_denied() {
        let (controller, clock) = controller();
        let config = RateLimitConfig::new(Duration::from_secs(60), 5);

        for _ in 0..6 {
            controller.check("/api/bookings", "1.2.3.4", &config);
        }
        clock.advance(Duration::from_millis(61_000));

        let decision = controller.check("/api/bookings", "1.2.3.4", &config);
        assert_eq!(
            decision,
            Decision::Allowed {
                limit: 5,
                remaining: 4
            }
        );
    }

    #[test]
    fn window_resets_exactly_at_boundary() {
        let (controller, clock) = controller();
        let config = RateLimitConfig::new(Duration::from_secs(10), 1);

        assert!(controller.check("/r", "c", &config).is_allowed());
        clock.advance(Duration::from_millis(9_999));
        assert!(!controller.check("/r", "c", &config).is_allowed());
        clock.advance(Duration::from_millis(1));
        assert!(controller.check("/r", "c", &config).is_allowed());
    }

    #[test]
    fn clients_and_routes_are_counted_separately() {
        let (controller, _) = controller();
        let config = RateLimitConfig::new(Duration::from_secs(60), 1);

        assert!(controller.check("/api/bookings", "1.1.1.1", &config).is_allowed());
        assert!(controller.check("/api/bookings", "2.2.2.2", &config).is_allowed());
        assert!(controller.check("/api/services", "1.1.1.1", &config).is_allowed());
        assert!(!controller.check("/api/bookings", "1.1.1.1", &config).is_allowed());
        assert_eq!(controller.tracked_keys(), 3);
    }

    #[test]
    fn housekeeping_sweeps_stale_windows_past_threshold() {
        let (controller, clock) = controller();
        let config = RateLimitConfig::new(Duration::from_secs(1), 10);

        for i in 0..=HOUSEKEEPING_THRESHOLD {
            controller.check("/r", &format!("client-{i}"), &config);
        }
        assert_eq!(controller.tracked_keys(), HOUSEKEEPING_THRESHOLD + 1);

        clock.advance(Duration::from_secs(2));
        controller.check("/r", "late", &config);

        assert_eq!(controller.tracked_keys(), 1);
    }

    /// Counts sweeps so tests can see when housekeeping actually ran.
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryRateStore,
        sweeps: std::sync::atomic::AtomicUsize,
    }

    impl RateStore for CountingStore {
        fn hit(&self, key: &str, config: &RateLimitConfig, now: Instant) -> Decision {
            self.inner.hit(key, config, now)
        }

        fn len(&self) -> usize {
            self.inner.len()
        }

        fn purge_stale(&self, now: Instant) -> usize {
            self.sweeps
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.inner.purge_stale(now)
        }
    }

    #[test]
    fn fruitless_sweep_is_not_repeated_within_a_window() {
        let clock = Arc::new(ManualClock::new());
        let store = Arc::new(CountingStore::default());
        let controller = AdmissionController::new(store.clone()).with_clock(clock.clone());
        let config = RateLimitConfig::new(Duration::from_secs(60), 10);
        let sweeps = || store.sweeps.load(std::sync::atomic::Ordering::SeqCst);

        for i in 0..=HOUSEKEEPING_THRESHOLD {
            controller.check("/r", &format!("client-{i}"), &config);
        }
        assert_eq!(sweeps(), 1, "first hit past the threshold sweeps once");

        for i in 0..100 {
            controller.check("/r", &format!("extra-{i}"), &config);
        }
        assert_eq!(sweeps(), 1, "live keys alone must not trigger rescans");

        clock.advance(Duration::from_secs(61));
        controller.check("/r", "late", &config);
        assert_eq!(sweeps(), 2);
        assert_eq!(controller.tracked_keys(), 1);
    }

    #[test]
    fn concurrent_hits_on_one_key_never_exceed_limit() {
        let controller = Arc::new(AdmissionController::in_memory());
        let config = RateLimitConfig::new(Duration::from_secs(60), 50);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let controller = controller.clone();
                std::thread::spawn(move || {
                    (0..25)
                        .filter(|_| controller.check("/r", "c", &config).is_allowed())
                        .count()
                })
            })
            .collect();
        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(allowed, 50);
    }

    #[test]
    fn client_identity_prefers_cdn_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("9.9.9.9, 8.8.8.8"));
        headers.insert("x-real-ip", HeaderValue::from_static("7.7.7.7"));
        headers.insert("cf-connecting-ip", HeaderValue::from_static("1.2.3.4"));
        assert_eq!(client_identity(&headers), "1.2.3.4");

        headers.remove("cf-connecting-ip");
        assert_eq!(client_identity(&headers), "7.7.7.7");

        headers.remove("x-real-ip");
        assert_eq!(client_identity(&headers), "9.9.9.9");
    }

    #[test]
    fn client_identity_skips_blank_values() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("  "));
        headers.insert("x-forwarded-for", HeaderValue::from_static(" , 5.6.7.8"));
        assert_eq!(client_identity(&headers), "5.6.7.8");
    }

    #[test]
    fn client_identity_falls_back_to_unknown() {
        assert_eq!(client_identity(&HeaderMap::new()), UNKNOWN_CLIENT);
    }
}
