//! Per-client fixed-window counters backing the `RateLimit` route filter.
//!
//! Each key owns a window that resets lazily on the first request after it expires.
use std::{fmt, time::Duration};

use tokio::time::Instant;

/// Windows kept before idle ones are purged.
const PURGE_THRESHOLD: usize = 4096;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u64,
}

/// Per-key fixed-window counter.
pub struct FixedWindowLimiter {
    max_requests: u64,
    window: Duration,
    windows: scc::HashMap<String, Window>,
}

impl fmt::Debug for FixedWindowLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixedWindowLimiter")
            .field("max_requests", &self.max_requests)
            .field("window", &self.window)
            .field("keys", &self.windows.len())
            .finish()
    }
}

impl FixedWindowLimiter {
    pub fn new(max_requests: u64, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            windows: scc::HashMap::new(),
        }
    }

    pub fn max_requests(&self) -> u64 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Count one request for `key`; returns whether it is within the limit.
    ///
    /// The check and the increment happen under exclusive access to the key's entry,
    /// so concurrent requests from one client never both take the last slot.
    pub async fn check(&self, key: &str) -> bool {
        let now = Instant::now();
        let allowed = {
            let mut entry = self
                .windows
                .entry_async(key.to_string())
                .await
                .or_insert_with(|| Window {
                    started: now,
                    count: 0,
                });
            let window = entry.get_mut();
            if now.duration_since(window.started) > self.window {
                window.started = now;
                window.count = 0;
            }
            if window.count >= self.max_requests {
                false
            } else {
                window.count += 1;
                true
            }
        };

        if self.windows.len() > PURGE_THRESHOLD {
            self.purge_expired(now).await;
        }
        allowed
    }

    async fn purge_expired(&self, now: Instant) {
        let window = self.window;
        self.windows
            .retain_async(|_, w| now.duration_since(w.started) <= window)
            .await;
        tracing::debug!(remaining = self.windows.len(), "Purged expired rate limit windows");
    }

    /// Number of clients currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_fixed_window_resets_after_expiry() {
        let limiter = FixedWindowLimiter::new(2, Duration::from_secs(10));
        assert!(limiter.check("10.0.0.1").await);
        assert!(limiter.check("10.0.0.1").await);
        assert!(!limiter.check("10.0.0.1").await);

        // Exactly at the window boundary the window has not expired yet.
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(!limiter.check("10.0.0.1").await);

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(limiter.check("10.0.0.1").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let limiter = FixedWindowLimiter::new(1, Duration::from_secs(10));
        assert!(limiter.check("a").await);
        assert!(!limiter.check("a").await);
        assert!(limiter.check("b").await);
        assert_eq!(limiter.tracked_keys(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_checks_never_exceed_the_limit() {
        let limiter = std::sync::Arc::new(FixedWindowLimiter::new(50, Duration::from_secs(60)));
        let mut handles = Vec::new();
        for _ in 0..200 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move { limiter.check("shared").await }));
        }
        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap() {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 50);
    }
}
