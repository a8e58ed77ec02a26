//! Sliding-window rate limiting keyed by (client identity, resource identity).
//!
//! Each key owns an ordered list of request timestamps within the trailing
//! window; the list is pruned lazily on every access. Keys that go idle would
//! otherwise leak, so a mandatory janitor sweep periodically drops any key
//! whose pruned list is empty.
//!
//! This state is per-replica only. Distributing limits consistently across
//! replicas is out of scope; the per-replica approximation is accepted.
use std::time::{Duration, Instant};

use scc::HashMap;

/// Composite key: one window per client per resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct WindowKey {
    client: String,
    resource: String,
}

/// In-memory sliding-window counter.
pub struct SlidingWindowLimiter {
    windows: HashMap<WindowKey, Vec<Instant>>,
    window: Duration,
}

impl SlidingWindowLimiter {
    /// Create a limiter with the given trailing window duration.
    pub fn new(window: Duration) -> Self {
        Self {
            windows: HashMap::new(),
            window,
        }
    }

    /// The configured window duration.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record a request and return the observed count within the window,
    /// including the request just recorded.
    ///
    /// The caller compares the count against its configured limit; this type
    /// deliberately has no opinion on what the limit is.
    pub async fn record_and_count(&self, client: &str, resource: &str) -> usize {
        let key = WindowKey {
            client: client.to_string(),
            resource: resource.to_string(),
        };
        let now = Instant::now();

        let mut entry = self
            .windows
            .entry_async(key)
            .await
            .or_insert_with(Vec::new);
        let timestamps = entry.get_mut();
        timestamps.retain(|ts| now.duration_since(*ts) <= self.window);
        timestamps.push(now);
        timestamps.len()
    }

    /// Drop every key whose window no longer holds any timestamps.
    ///
    /// Without this, one request from an idle client would pin its key
    /// forever.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows
            .retain_async(|_, timestamps| {
                timestamps.retain(|ts| now.duration_since(*ts) <= self.window);
                !timestamps.is_empty()
            })
            .await;
        before - self.windows.len()
    }

    /// Number of live (client, resource) windows being tracked.
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    /// Run the janitor loop: sweep on a fixed interval, forever.
    pub async fn run_janitor(&self, interval: Duration) {
        tracing::info!(
            "Rate limiter janitor started, sweeping every {}s",
            interval.as_secs()
        );
        loop {
            tokio::time::sleep(interval).await;
            let dropped = self.sweep().await;
            if dropped > 0 {
                tracing::debug!("Rate limiter janitor dropped {} idle keys", dropped);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_kth_call_returns_k() {
        let limiter = SlidingWindowLimiter::new(Duration::from_secs(60));
        for k in 1..=5 {
            let count = limiter.record_and_count("1.2.3.4", "hash-a").await;
            assert_eq!(count, k);
        }
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let limiter = SlidingWindowLimiter::new(Duration::from_secs(60));
        for _ in 0..3 {
            limiter.record_and_count("1.2.3.4", "hash-a").await;
        }

        assert_eq!(limiter.record_and_count("1.2.3.4", "hash-b").await, 1);
        assert_eq!(limiter.record_and_count("5.6.7.8", "hash-a").await, 1);
        assert_eq!(limiter.record_and_count("1.2.3.4", "hash-a").await, 4);
    }

    #[tokio::test]
    async fn test_window_expiry_resets_count() {
        let limiter = SlidingWindowLimiter::new(Duration::from_millis(50));
        for _ in 0..4 {
            limiter.record_and_count("1.2.3.4", "hash-a").await;
        }

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(limiter.record_and_count("1.2.3.4", "hash-a").await, 1);
    }

    #[tokio::test]
    async fn test_sweep_drops_idle_keys_only() {
        let limiter = SlidingWindowLimiter::new(Duration::from_millis(50));
        limiter.record_and_count("idle", "hash-a").await;
        tokio::time::sleep(Duration::from_millis(80)).await;
        limiter.record_and_count("active", "hash-a").await;

        let dropped = limiter.sweep().await;
        assert_eq!(dropped, 1);
        assert_eq!(limiter.tracked_keys(), 1);

        // The active key's count is unaffected by the sweep.
        assert_eq!(limiter.record_and_count("active", "hash-a").await, 2);
    }
}
