//! Load-based backend selection with a short-TTL cache and tolerance-band
//! tie-breaking.
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use arc_swap::ArcSwapOption;
use rand::Rng;

use crate::{
    core::{backend::CdnEntry, registry::CdnRegistry},
    ports::registry_store::StoreResult,
};

/// The memorized choice of backend.
#[derive(Debug, Clone)]
pub struct CachedChoice {
    /// The chosen backend URL
    pub url: String,
    /// When the choice was computed
    pub computed_at: Instant,
}

/// Selection engine over registry snapshots.
///
/// The cache exists purely to avoid a full registry scan on every request;
/// its TTL is independent of (and typically shorter than) the poll interval.
/// Serving from cache still re-checks the single cached entry's health, so an
/// unhealthy or evicted backend is never handed out, regardless of cache
/// freshness.
pub struct SelectionEngine {
    cache: ArcSwapOption<CachedChoice>,
    ttl: Duration,
    tolerance: u64,
}

impl SelectionEngine {
    /// Create an engine with the given cache TTL and load tolerance band.
    pub fn new(ttl: Duration, tolerance: u64) -> Self {
        Self {
            cache: ArcSwapOption::const_empty(),
            ttl,
            tolerance,
        }
    }

    /// Select the best backend, consulting the cache first.
    ///
    /// A fresh cached choice costs one single-key registry read (to confirm
    /// the backend is still registered and healthy); a stale or invalidated
    /// cache triggers a full snapshot recomputation.
    pub async fn select(&self, registry: &CdnRegistry) -> StoreResult<Option<String>> {
        if let Some(cached) = self.cache.load_full()
            && cached.computed_at.elapsed() < self.ttl
        {
            match registry.get(&cached.url).await? {
                Some(entry) if entry.healthy => return Ok(Some(cached.url.clone())),
                _ => {
                    tracing::debug!(
                        "Cached backend {} no longer healthy, recomputing selection",
                        cached.url
                    );
                }
            }
        }

        let snapshot = registry.list().await?;
        Ok(self.recompute(&snapshot))
    }

    /// Recompute the choice from a registry snapshot and refresh the cache.
    ///
    /// Filters to healthy entries, takes every entry within `tolerance` of
    /// the minimum load and picks uniformly at random among them. The random
    /// tie-break is a load-spreading decision: pinning all traffic to a
    /// deterministic minimum would herd clients onto one node.
    pub fn recompute(&self, snapshot: &[(String, CdnEntry)]) -> Option<String> {
        let healthy: Vec<(&String, u64)> = snapshot
            .iter()
            .filter(|(_, entry)| entry.healthy)
            .map(|(url, entry)| (url, entry.load))
            .collect();

        let Some(min_load) = healthy.iter().map(|(_, load)| *load).min() else {
            self.cache.store(None);
            return None;
        };

        let candidates: Vec<&String> = healthy
            .iter()
            .filter(|(_, load)| load - min_load <= self.tolerance)
            .map(|(url, _)| *url)
            .collect();

        let index = rand::rng().random_range(0..candidates.len());
        let chosen = candidates[index].clone();

        self.cache.store(Some(Arc::new(CachedChoice {
            url: chosen.clone(),
            computed_at: Instant::now(),
        })));

        Some(chosen)
    }

    /// Current cached choice, if any (diagnostics only).
    pub fn cached(&self) -> Option<CachedChoice> {
        self.cache.load_full().map(|c| (*c).clone())
    }
}
