use std::{sync::Arc, time::Duration};

use eyre::Result;
use tokio::{sync::Semaphore, task::JoinSet, time::sleep};

use crate::{
    core::{
        DirectorService,
        backend::{ProbeOutcome, UNKNOWN_LOAD, aggregate_load},
        registry::ProbeDisposition,
    },
    metrics,
    ports::{
        http_client::{HttpClient, HttpClientError},
        leadership::LeaderCheck,
    },
};

/// Leader-only background loop that probes every registered backend,
/// feeds results into the registry and keeps the selection cache and
/// trusted-host set warm.
///
/// The loop never terminates on its own and never backs off: a universally
/// down backend set just means every cycle returns all-failed, accruing
/// toward eviction at a fixed cadence. Probe and store errors are logged and
/// the loop continues on the next cycle.
pub struct HealthPoller {
    director: Arc<DirectorService>,
    http_client: Arc<dyn HttpClient>,
    leader: Arc<dyn LeaderCheck>,
    interval: Duration,
    probe_timeout_secs: u64,
    concurrency: usize,
}

impl HealthPoller {
    /// Create a poller over the director's registry.
    pub fn new(
        director: Arc<DirectorService>,
        http_client: Arc<dyn HttpClient>,
        leader: Arc<dyn LeaderCheck>,
        interval: Duration,
        probe_timeout_secs: u64,
        concurrency: usize,
    ) -> Self {
        Self {
            director,
            http_client,
            leader,
            interval,
            probe_timeout_secs,
            concurrency: concurrency.max(1),
        }
    }

    /// Run the polling loop.
    ///
    /// Non-leaders return immediately; the registry on those replicas is kept
    /// fresh by whoever does lead, through the shared store.
    pub async fn run(&self) -> Result<()> {
        if !self.leader.is_leader() {
            tracing::info!("Not the poller leader, health polling disabled on this replica");
            return Ok(());
        }

        tracing::info!(
            "Starting health poller: interval {}s, probe timeout {}s, fail threshold {}, concurrency {}",
            self.interval.as_secs(),
            self.probe_timeout_secs,
            self.director.registry().fail_threshold(),
            self.concurrency
        );

        loop {
            // Sleep first so the server can come up before the first sweep
            sleep(self.interval).await;

            if let Err(e) = self.cycle().await {
                tracing::error!("Polling cycle failed, retrying next interval: {}", e);
            }
        }
    }

    /// Execute one full polling cycle: probe, apply, recompute.
    pub async fn cycle(&self) -> Result<()> {
        let snapshot = self.director.registry().list().await?;
        let urls: Vec<String> = snapshot.into_iter().map(|(url, _)| url).collect();

        if urls.is_empty() {
            tracing::debug!("No backends registered, skipping polling cycle");
            return Ok(());
        }

        let results = self.probe_all(urls).await;
        self.apply_results(results).await?;
        metrics::increment_poll_cycles();
        Ok(())
    }

    /// Probe every URL concurrently through a bounded worker pool.
    ///
    /// Total cycle latency is bounded by the slowest probe's timeout, not the
    /// sum of all probes.
    pub async fn probe_all(&self, urls: Vec<String>) -> Vec<(String, ProbeOutcome)> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for url in urls {
            let client = self.http_client.clone();
            let semaphore = semaphore.clone();
            let timeout_secs = self.probe_timeout_secs;

            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("probe semaphore closed");
                let outcome = Self::probe_one(client.as_ref(), &url, timeout_secs).await;
                (url, outcome)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => tracing::error!("Probe task panicked: {}", e),
            }
        }
        results
    }

    async fn probe_one(
        client: &dyn HttpClient,
        url: &str,
        timeout_secs: u64,
    ) -> ProbeOutcome {
        let status_url = format!("{url}/status");
        match client.fetch_status(&status_url, timeout_secs).await {
            Ok(status) => {
                let load = aggregate_load(&status);
                tracing::debug!("Probe OK {}: load={}", url, load);
                ProbeOutcome::success(load)
            }
            // Reachable but not speaking the status contract: maximally
            // loaded, not failed.
            Err(HttpClientError::MalformedBody { reason, .. }) => {
                tracing::debug!("Probe OK {} but malformed status body: {}", url, reason);
                ProbeOutcome::success(UNKNOWN_LOAD)
            }
            Err(e) => {
                tracing::debug!("Probe DOWN {}: {}", url, e);
                ProbeOutcome::failure()
            }
        }
    }

    /// Feed probe results into the registry, then recompute the selection
    /// cache and trusted hosts from the post-application snapshot so readers
    /// never see either run ahead of the registry writes that produced them.
    pub async fn apply_results(&self, results: Vec<(String, ProbeOutcome)>) -> Result<()> {
        let registry = self.director.registry();
        let mut evicted = 0usize;

        for (url, outcome) in results {
            match registry.record_probe(&url, outcome).await? {
                ProbeDisposition::Evicted => {
                    evicted += 1;
                    metrics::set_backend_health_status(&url, false);
                }
                ProbeDisposition::Updated => {
                    metrics::set_backend_health_status(&url, outcome.ok);
                }
                ProbeDisposition::Unregistered => {}
            }
        }

        let snapshot = registry.list().await?;
        let healthy = snapshot.iter().filter(|(_, e)| e.healthy).count();
        metrics::set_registered_backends(snapshot.len());

        self.director.selection().recompute(&snapshot);
        self.director.rebuild_trust(&snapshot);

        tracing::info!(
            "Polling cycle complete: {} backends, {} healthy, {} evicted",
            snapshot.len(),
            healthy,
            evicted
        );
        Ok(())
    }
}
