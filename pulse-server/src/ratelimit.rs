//! Sliding fixed-window rate limiter keyed by caller identity.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pulse_core::limits::{RATE_LIMIT, RATE_WINDOW};

/// Entries beyond this trigger an opportunistic sweep of expired windows, so
/// an adversarial flood of distinct identities cannot grow the map without
/// bound.
const SWEEP_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone)]
struct RateLimitEntry {
    count: u32,
    window_start: DateTime<Utc>,
}

pub struct RateLimiter {
    entries: Mutex<HashMap<String, RateLimitEntry>>,
    limit: u32,
    window: chrono::Duration,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::with_limits(RATE_LIMIT, RATE_WINDOW)
    }
}

impl RateLimiter {
    pub fn with_limits(limit: u32, window: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            limit,
            window: chrono::Duration::from_std(window).unwrap_or(chrono::Duration::hours(1)),
        }
    }

    /// Record one request from `key` and report whether it is allowed. The
    /// whole read-modify-write runs under the lock, so concurrent requests
    /// for the same key never lose updates.
    pub fn check(&self, key: &str, now: DateTime<Utc>) -> bool {
        let mut entries = self.entries.lock().expect("rate limiter lock poisoned");

        if entries.len() >= SWEEP_THRESHOLD {
            let window = self.window;
            entries.retain(|_, entry| now - entry.window_start < window);
        }

        match entries.get_mut(key) {
            Some(entry) if now - entry.window_start < self.window => {
                entry.count += 1;
                entry.count <= self.limit
            }
            _ => {
                // First sighting, or the previous window rolled over.
                entries.insert(
                    key.to_string(),
                    RateLimitEntry {
                        count: 1,
                        window_start: now,
                    },
                );
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_rejects_the_101st_request() {
        let limiter = RateLimiter::default();
        let now = Utc::now();
        for i in 0..100 {
            assert!(limiter.check("1.2.3.4", now), "request {} should pass", i + 1);
        }
        assert!(!limiter.check("1.2.3.4", now), "101st request must be rejected");
    }

    #[test]
    fn test_window_rollover_resets_count() {
        let limiter = RateLimiter::with_limits(2, Duration::from_secs(60));
        let now = Utc::now();
        assert!(limiter.check("k", now));
        assert!(limiter.check("k", now));
        assert!(!limiter.check("k", now + chrono::Duration::seconds(30)));
        // Past the window the entry resets.
        assert!(limiter.check("k", now + chrono::Duration::seconds(61)));
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = RateLimiter::with_limits(1, Duration::from_secs(60));
        let now = Utc::now();
        assert!(limiter.check("a", now));
        assert!(!limiter.check("a", now));
        assert!(limiter.check("b", now));
    }

    #[test]
    fn test_sweep_drops_expired_entries() {
        let limiter = RateLimiter::with_limits(5, Duration::from_secs(60));
        let start = Utc::now();
        for i in 0..SWEEP_THRESHOLD {
            limiter.check(&format!("key-{i}"), start);
        }
        assert_eq!(limiter.entries.lock().unwrap().len(), SWEEP_THRESHOLD);

        // Next check after the window sweeps everything expired.
        limiter.check("fresh", start + chrono::Duration::seconds(61));
        assert_eq!(limiter.entries.lock().unwrap().len(), 1);
    }
}
