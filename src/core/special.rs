//! In-process mirror of the externally shared special-hash set.
//!
//! Hashes in this set are never routed to a backend; they always redirect to
//! the configured override destination. The cache is refreshed by whole-set
//! overwrite on a fixed interval; a failed refresh keeps the last known good
//! snapshot (fail-open) and is never fatal.
use std::{collections::HashSet, sync::Arc, time::Duration};

use arc_swap::ArcSwap;

use crate::ports::{registry_store::StoreResult, set_store::SetStore};

/// Periodically refreshed snapshot of one named set in the shared store.
pub struct SpecialSetCache {
    store: Arc<dyn SetStore>,
    set_name: String,
    snapshot: ArcSwap<HashSet<String>>,
}

impl SpecialSetCache {
    /// Create a cache mirroring `set_name`, initially empty until refreshed.
    pub fn new(store: Arc<dyn SetStore>, set_name: impl Into<String>) -> Self {
        Self {
            store,
            set_name: set_name.into(),
            snapshot: ArcSwap::from_pointee(HashSet::new()),
        }
    }

    /// Whether a hash is in the (cached) special set.
    pub fn contains(&self, hash: &str) -> bool {
        self.snapshot.load().contains(hash)
    }

    /// Current snapshot (diagnostics only).
    pub fn snapshot(&self) -> Vec<String> {
        let mut members: Vec<String> = self.snapshot.load().iter().cloned().collect();
        members.sort();
        members
    }

    /// Replace the in-process snapshot with the store's current membership.
    pub async fn refresh(&self) -> StoreResult<usize> {
        let members = self.store.list_members(&self.set_name).await?;
        let count = members.len();
        self.snapshot.store(Arc::new(members.into_iter().collect()));
        Ok(count)
    }

    /// Add hashes to the shared store, then refresh synchronously so the
    /// caller observes its own write on the very next request.
    pub async fn add(&self, hashes: &[String]) -> StoreResult<usize> {
        self.store.add_members(&self.set_name, hashes).await?;
        self.refresh().await
    }

    /// Run the background refresh loop forever. Refresh errors are logged and
    /// the previous snapshot stays in place.
    pub async fn run_refresher(&self, interval: Duration) {
        tracing::info!(
            "Special-set refresher started for '{}', refreshing every {}s",
            self.set_name,
            interval.as_secs()
        );
        loop {
            tokio::time::sleep(interval).await;
            match self.refresh().await {
                Ok(count) => {
                    tracing::debug!("Special set '{}' refreshed, {} members", self.set_name, count)
                }
                Err(e) => tracing::warn!(
                    "Special set '{}' refresh failed, keeping previous snapshot: {}",
                    self.set_name,
                    e
                ),
            }
        }
    }
}
