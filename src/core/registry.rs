//! CDN registry: the authoritative set of backend nodes and their
//! failure-accrual state machine.
//!
//! The registry owns all mutations of persisted `CdnEntry` records. Callers
//! never touch the store directly, so the eviction-on-threshold invariant
//! cannot be bypassed. Registration is idempotent; probe recording is
//! last-writer-wins per observation, which is what makes duplicate poller
//! leaders tolerable.
use std::sync::Arc;

use chrono::Utc;

use crate::{
    core::backend::{CdnEntry, CdnUrl, ProbeOutcome, UNKNOWN_LOAD},
    ports::registry_store::{RegistryStore, StoreResult},
};

/// What `record_probe` did with the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeDisposition {
    /// Entry updated in place (healthy, or unhealthy within tolerance)
    Updated,
    /// Consecutive failures reached the threshold; entry deleted
    Evicted,
    /// The probed URL is no longer registered (raced with an eviction)
    Unregistered,
}

/// In-process logic over the registry store.
pub struct CdnRegistry {
    store: Arc<dyn RegistryStore>,
    fail_threshold: u32,
}

impl CdnRegistry {
    /// Create a registry over a store with the given eviction threshold.
    ///
    /// `fail_threshold` is `ceil(eviction_grace / poll_interval)`, computed by
    /// the configuration layer; values below 1 are clamped to 1.
    pub fn new(store: Arc<dyn RegistryStore>, fail_threshold: u32) -> Self {
        Self {
            store,
            fail_threshold: fail_threshold.max(1),
        }
    }

    /// The number of consecutive probe failures that triggers eviction.
    pub fn fail_threshold(&self) -> u32 {
        self.fail_threshold
    }

    /// Register a backend if absent. Returns whether it was newly added.
    ///
    /// Re-registering an existing URL is a no-op, not a reset: whatever health
    /// state the poller has accrued for it is preserved.
    pub async fn register(&self, url: &CdnUrl) -> StoreResult<bool> {
        if self.store.get(url.as_str()).await?.is_some() {
            tracing::debug!("Backend {} already registered, skipping", url);
            return Ok(false);
        }

        self.store
            .put(url.as_str(), &CdnEntry::registered(Utc::now()))
            .await?;
        tracing::info!("Registered backend {}", url);
        Ok(true)
    }

    /// Apply one probe result to a backend's entry.
    pub async fn record_probe(
        &self,
        url: &str,
        outcome: ProbeOutcome,
    ) -> StoreResult<ProbeDisposition> {
        let Some(mut entry) = self.store.get(url).await? else {
            tracing::debug!("Probe result for unregistered backend {}, ignoring", url);
            return Ok(ProbeDisposition::Unregistered);
        };

        entry.updated_at = Utc::now();

        if outcome.ok {
            entry.healthy = true;
            entry.load = outcome.load;
            entry.fail_count = 0;
            self.store.put(url, &entry).await?;
            return Ok(ProbeDisposition::Updated);
        }

        entry.fail_count += 1;
        if entry.fail_count >= self.fail_threshold {
            self.store.delete(url).await?;
            tracing::warn!(
                "Evicted backend {} after {} consecutive probe failures",
                url,
                entry.fail_count
            );
            return Ok(ProbeDisposition::Evicted);
        }

        entry.healthy = false;
        entry.load = UNKNOWN_LOAD;
        self.store.put(url, &entry).await?;
        Ok(ProbeDisposition::Updated)
    }

    /// Ordered snapshot of all registered backends.
    pub async fn list(&self) -> StoreResult<Vec<(String, CdnEntry)>> {
        self.store.scan_all().await
    }

    /// Fetch a single backend's entry.
    pub async fn get(&self, url: &str) -> StoreResult<Option<CdnEntry>> {
        self.store.get(url).await
    }

    /// Remove a backend outright.
    pub async fn delete(&self, url: &str) -> StoreResult<()> {
        self.store.delete(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_store::MemoryRegistryStore;

    fn registry(threshold: u32) -> CdnRegistry {
        CdnRegistry::new(Arc::new(MemoryRegistryStore::new()), threshold)
    }

    fn cdn(url: &str) -> CdnUrl {
        CdnUrl::new(url).expect("valid test URL")
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let registry = registry(3);
        let url = cdn("http://a.example.com");

        assert!(registry.register(&url).await.unwrap());

        // Accrue some state, then re-register; state must survive.
        registry
            .record_probe(url.as_str(), ProbeOutcome::success(7))
            .await
            .unwrap();
        assert!(!registry.register(&url).await.unwrap());

        let entry = registry.get(url.as_str()).await.unwrap().unwrap();
        assert!(entry.healthy);
        assert_eq!(entry.load, 7);
    }

    #[tokio::test]
    async fn test_success_resets_fail_count() {
        let registry = registry(3);
        let url = cdn("http://a.example.com");
        registry.register(&url).await.unwrap();

        for _ in 0..2 {
            registry
                .record_probe(url.as_str(), ProbeOutcome::failure())
                .await
                .unwrap();
        }
        let entry = registry.get(url.as_str()).await.unwrap().unwrap();
        assert_eq!(entry.fail_count, 2);
        assert!(!entry.healthy);
        assert_eq!(entry.load, UNKNOWN_LOAD);

        registry
            .record_probe(url.as_str(), ProbeOutcome::success(4))
            .await
            .unwrap();
        let entry = registry.get(url.as_str()).await.unwrap().unwrap();
        assert_eq!(entry.fail_count, 0);
        assert!(entry.healthy);
        assert_eq!(entry.load, 4);
    }

    #[tokio::test]
    async fn test_eviction_at_threshold_never_before() {
        let registry = registry(3);
        let url = cdn("http://a.example.com");
        registry.register(&url).await.unwrap();

        for expected_remaining in [true, true, false] {
            let disposition = registry
                .record_probe(url.as_str(), ProbeOutcome::failure())
                .await
                .unwrap();
            let present = registry.get(url.as_str()).await.unwrap().is_some();
            assert_eq!(present, expected_remaining);
            if expected_remaining {
                assert_eq!(disposition, ProbeDisposition::Updated);
            } else {
                assert_eq!(disposition, ProbeDisposition::Evicted);
            }
        }

        // Further probes for the purged URL are ignored.
        let disposition = registry
            .record_probe(url.as_str(), ProbeOutcome::failure())
            .await
            .unwrap();
        assert_eq!(disposition, ProbeDisposition::Unregistered);
    }

    #[tokio::test]
    async fn test_healthy_implies_zero_fail_count() {
        let registry = registry(5);
        let url = cdn("http://a.example.com");
        registry.register(&url).await.unwrap();

        let outcomes = [
            ProbeOutcome::failure(),
            ProbeOutcome::success(1),
            ProbeOutcome::failure(),
            ProbeOutcome::failure(),
            ProbeOutcome::success(9),
        ];
        for outcome in outcomes {
            registry.record_probe(url.as_str(), outcome).await.unwrap();
            if let Some(entry) = registry.get(url.as_str()).await.unwrap()
                && entry.healthy
            {
                assert_eq!(entry.fail_count, 0);
            }
        }
    }

    #[tokio::test]
    async fn test_threshold_clamped_to_one() {
        let registry = registry(0);
        let url = cdn("http://a.example.com");
        registry.register(&url).await.unwrap();

        let disposition = registry
            .record_probe(url.as_str(), ProbeOutcome::failure())
            .await
            .unwrap();
        assert_eq!(disposition, ProbeDisposition::Evicted);
    }

    #[tokio::test]
    async fn test_list_is_ordered_by_url() {
        let registry = registry(3);
        for raw in ["http://c.example.com", "http://a.example.com", "http://b.example.com"] {
            registry.register(&cdn(raw)).await.unwrap();
        }

        let urls: Vec<String> = registry
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|(url, _)| url)
            .collect();
        assert_eq!(
            urls,
            vec![
                "http://a.example.com",
                "http://b.example.com",
                "http://c.example.com"
            ]
        );
    }
}
