use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::{Decision, RateLimitConfig};

/// Backing store for rate windows.
///
/// The controller only talks to this trait, so the in-process map can be
/// replaced by a shared store without touching call sites.
pub trait RateStore: Send + Sync {
    /// Records one request for `key` and returns the admission decision.
    /// Must be atomic per key.
    fn hit(&self, key: &str, config: &RateLimitConfig, now: Instant) -> Decision;

    /// Number of tracked keys.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every window older than its own length. Returns how many were removed.
    fn purge_stale(&self, now: Instant) -> usize;
}

#[derive(Debug, Clone)]
pub struct RateWindow {
    pub count: u32,
    pub window_start: Instant,
    pub window: Duration,
}

impl RateWindow {
    fn fresh(now: Instant, window: Duration) -> Self {
        Self {
            count: 1,
            window_start: now,
            window,
        }
    }

    fn is_stale(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.window_start) >= self.window
    }

    fn retry_after_secs(&self, now: Instant) -> u64 {
        let left = (self.window_start + self.window).saturating_duration_since(now);
        let millis = left.as_millis() as u64;
        millis.div_ceil(1000).max(1)
    }
}

/// Process-local store, sharded so distinct keys never contend on one lock.
#[derive(Debug, Default)]
pub struct MemoryRateStore {
    windows: DashMap<String, RateWindow>,
}

impl MemoryRateStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn window(&self, key: &str) -> Option<RateWindow> {
        self.windows.get(key).map(|w| w.value().clone())
    }
}

impl RateStore for MemoryRateStore {
    fn hit(&self, key: &str, config: &RateLimitConfig, now: Instant) -> Decision {
        let opened = Decision::Allowed {
            limit: config.max_requests,
            remaining: config.max_requests.saturating_sub(1),
        };

        // The entry guard holds the shard lock for the whole read-modify-write.
        let mut occupied = match self.windows.entry(key.to_string()) {
            Entry::Vacant(vacant) => {
                vacant.insert(RateWindow::fresh(now, config.window));
                return opened;
            }
            Entry::Occupied(occupied) => occupied,
        };
        let window = occupied.get_mut();

        if window.is_stale(now) {
            *window = RateWindow::fresh(now, config.window);
            return opened;
        }

        if window.count < config.max_requests {
            window.count += 1;
            return Decision::Allowed {
                limit: config.max_requests,
                remaining: config.max_requests - window.count,
            };
        }

        Decision::Denied {
            limit: config.max_requests,
            retry_after_secs: window.retry_after_secs(now),
        }
    }

    fn len(&self) -> usize {
        self.windows.len()
    }

    fn purge_stale(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, window| !window.is_stale(now));
        before.saturating_sub(self.windows.len())
    }
}
