//! Request orchestration: the decision pipeline behind `/dl` and `/watch`.
//!
//! Incoming request -> rate-limiter check -> special-hash / referrer-trust
//! check -> backend selection -> redirect or proxy decision. The director
//! owns the core components and exposes them to the background tasks (health
//! poller, special-set refresher, rate-limiter janitor); all HTTP concerns
//! stay in the adapter layer.
use std::sync::Arc;

use crate::{
    core::{
        backend::{BackendError, CdnUrl},
        rate_limit::SlidingWindowLimiter,
        registry::CdnRegistry,
        selection::SelectionEngine,
        special::SpecialSetCache,
        trust::TrustedHosts,
    },
    ports::registry_store::StoreResult,
};

/// Which content route a request came in on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// `/dl/{hash}/{path}` downloads
    Download,
    /// `/watch/{hash}/{path}` streaming
    Watch,
}

impl ContentKind {
    /// URL path segment for this kind on both our routes and the backends'.
    pub fn segment(&self) -> &'static str {
        match self {
            ContentKind::Download => "dl",
            ContentKind::Watch => "watch",
        }
    }
}

/// How a selected backend is handed to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Respond with a redirect to the backend (default)
    Redirect,
    /// Stream the backend's response through this process
    Proxy,
}

/// The director's verdict for one content request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// Special hash or blocked referrer: send to the override destination
    Override {
        /// Absolute URL to redirect to
        location: String,
    },
    /// Client exceeded the sliding-window limit for this hash
    RateLimited {
        /// Configured maximum requests per window
        allowed: i64,
        /// Requests observed in the window, including this one
        observed: usize,
        /// Window length in seconds
        window_seconds: u64,
    },
    /// No healthy backend exists right now
    Unavailable,
    /// Redirect the client to the chosen backend
    Redirect {
        /// Absolute URL on the chosen backend
        location: String,
        /// Configured redirect status code (301 or 302)
        status: u16,
    },
    /// Proxy the request through to the chosen backend
    Proxy {
        /// Absolute URL on the chosen backend
        target: String,
    },
}

/// Outcome of an administrative backend-registration batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddReport {
    /// URLs newly added (normalized form)
    pub added: Vec<String>,
    /// Inputs skipped as invalid or already registered
    pub skipped: Vec<String>,
    /// Registry size after the batch
    pub total: usize,
}

/// Tunables the director needs from configuration.
#[derive(Debug, Clone)]
pub struct DirectorPolicy {
    /// Max requests per client per hash per window; `<= 0` disables limiting
    pub max_requests_per_ip: i64,
    /// Sliding window length in seconds (reported in 429 payloads)
    pub window_seconds: u64,
    /// Redirect status code handed back for backend redirects
    pub redirect_code: u16,
    /// Redirect vs proxy delivery
    pub delivery: DeliveryMode,
    /// Absolute URL prefix for override redirects
    pub override_destination: String,
}

/// Central orchestrator owning the core components. Cheap to share via `Arc`.
pub struct DirectorService {
    registry: Arc<CdnRegistry>,
    selection: Arc<SelectionEngine>,
    limiter: Arc<SlidingWindowLimiter>,
    special: Arc<SpecialSetCache>,
    trust: Arc<TrustedHosts>,
    usage: scc::HashMap<String, u64>,
    policy: DirectorPolicy,
}

impl DirectorService {
    /// Assemble the director from its components.
    pub fn new(
        registry: Arc<CdnRegistry>,
        selection: Arc<SelectionEngine>,
        limiter: Arc<SlidingWindowLimiter>,
        special: Arc<SpecialSetCache>,
        trust: Arc<TrustedHosts>,
        policy: DirectorPolicy,
    ) -> Self {
        let policy = DirectorPolicy {
            override_destination: policy.override_destination.trim_end_matches('/').to_string(),
            ..policy
        };
        Self {
            registry,
            selection,
            limiter,
            special,
            trust,
            usage: scc::HashMap::new(),
            policy,
        }
    }

    /// The CDN registry (shared with the health poller).
    pub fn registry(&self) -> &Arc<CdnRegistry> {
        &self.registry
    }

    /// The selection engine (shared with the health poller).
    pub fn selection(&self) -> &Arc<SelectionEngine> {
        &self.selection
    }

    /// The sliding-window limiter (shared with the janitor task).
    pub fn limiter(&self) -> &Arc<SlidingWindowLimiter> {
        &self.limiter
    }

    /// The special-set cache (shared with the refresher task).
    pub fn special(&self) -> &Arc<SpecialSetCache> {
        &self.special
    }

    /// The derived trusted-host set.
    pub fn trust(&self) -> &Arc<TrustedHosts> {
        &self.trust
    }

    /// The director's routing policy.
    pub fn policy(&self) -> &DirectorPolicy {
        &self.policy
    }

    /// Decide how to answer one content request.
    ///
    /// Store failures propagate: there is no safe routing answer without the
    /// registry, so the caller maps the error to service-unavailable.
    pub async fn route(
        &self,
        kind: ContentKind,
        hash: &str,
        path: &str,
        client_ip: &str,
        referrer: Option<&str>,
    ) -> StoreResult<RouteDecision> {
        self.bump_usage(hash).await;

        let observed = self.limiter.record_and_count(client_ip, hash).await;
        if self.policy.max_requests_per_ip > 0
            && observed as i64 > self.policy.max_requests_per_ip
        {
            tracing::info!(
                "Rate limited {} for hash {} ({} > {})",
                client_ip,
                hash,
                observed,
                self.policy.max_requests_per_ip
            );
            return Ok(RouteDecision::RateLimited {
                allowed: self.policy.max_requests_per_ip,
                observed,
                window_seconds: self.policy.window_seconds,
            });
        }

        if self.special.contains(hash) {
            tracing::debug!("Hash {} is special, overriding destination", hash);
            return Ok(RouteDecision::Override {
                location: self.join_target(&self.policy.override_destination, kind, hash, path),
            });
        }

        if !self.trust.referrer_allowed(referrer) {
            tracing::debug!(
                "Blocked referrer {:?} for hash {}, overriding destination",
                referrer,
                hash
            );
            return Ok(RouteDecision::Override {
                location: self.join_target(&self.policy.override_destination, kind, hash, path),
            });
        }

        let Some(backend) = self.selection.select(&self.registry).await? else {
            return Ok(RouteDecision::Unavailable);
        };

        let target = self.join_target(&backend, kind, hash, path);
        Ok(match self.policy.delivery {
            DeliveryMode::Redirect => RouteDecision::Redirect {
                location: target,
                status: self.policy.redirect_code,
            },
            DeliveryMode::Proxy => RouteDecision::Proxy { target },
        })
    }

    fn join_target(&self, base: &str, kind: ContentKind, hash: &str, path: &str) -> String {
        if path.is_empty() {
            format!("{}/{}/{}", base, kind.segment(), hash)
        } else {
            format!("{}/{}/{}/{}", base, kind.segment(), hash, path)
        }
    }

    async fn bump_usage(&self, hash: &str) {
        let mut entry = self
            .usage
            .entry_async(hash.to_string())
            .await
            .or_insert(0);
        *entry.get_mut() += 1;
    }

    /// Register a batch of backend URLs.
    ///
    /// Envelope validation happened at the HTTP layer; here each item is
    /// applied independently: invalid URLs and duplicates are skipped, valid
    /// ones are registered. The trusted-host set is rebuilt afterwards.
    pub async fn register_backends(&self, raw_urls: &[String]) -> StoreResult<AddReport> {
        let mut added = Vec::new();
        let mut skipped = Vec::new();

        for raw in raw_urls {
            match CdnUrl::new(raw) {
                Ok(url) => {
                    if self.registry.register(&url).await? {
                        added.push(url.into_string());
                    } else {
                        skipped.push(url.into_string());
                    }
                }
                Err(BackendError::InvalidUrl(reason)) => {
                    tracing::warn!("Skipping invalid backend URL in add batch: {}", reason);
                    skipped.push(raw.clone());
                }
            }
        }

        let snapshot = self.registry.list().await?;
        self.rebuild_trust(&snapshot);

        Ok(AddReport {
            added,
            skipped,
            total: snapshot.len(),
        })
    }

    /// Rebuild the trusted-host set from a registry snapshot.
    pub fn rebuild_trust(&self, snapshot: &[(String, crate::core::backend::CdnEntry)]) {
        let hosts: Vec<String> = snapshot
            .iter()
            .filter_map(|(url, _)| CdnUrl::new(url).ok().map(|u| u.host().to_string()))
            .collect();
        self.trust.rebuild(hosts.iter().map(|h| h.as_str()));
    }

    /// Administrative introspection dump.
    pub async fn stats(&self) -> StoreResult<serde_json::Value> {
        let snapshot = self.registry.list().await?;
        let mut servers = serde_json::Map::new();
        for (url, entry) in &snapshot {
            servers.insert(
                url.clone(),
                serde_json::to_value(entry).unwrap_or(serde_json::Value::Null),
            );
        }

        let mut usage = serde_json::Map::new();
        self.usage.iter_sync(|hash, count| {
            usage.insert(hash.clone(), serde_json::Value::from(*count));
            true
        });

        let selection = self.selection.cached().map(|choice| {
            serde_json::json!({
                "url": choice.url,
                "age_seconds": choice.computed_at.elapsed().as_secs(),
            })
        });

        Ok(serde_json::json!({
            "servers": servers,
            "usage": usage,
            "trusted_hosts": self.trust.snapshot(),
            "selection_cache": selection,
            "special_hashes": self.special.snapshot(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        adapters::memory_store::{MemoryRegistryStore, MemorySetStore},
        core::backend::ProbeOutcome,
    };

    fn policy() -> DirectorPolicy {
        DirectorPolicy {
            max_requests_per_ip: 3,
            window_seconds: 60,
            redirect_code: 302,
            delivery: DeliveryMode::Redirect,
            override_destination: "https://fallback.example.com/".to_string(),
        }
    }

    fn director(policy: DirectorPolicy) -> DirectorService {
        DirectorService::new(
            Arc::new(CdnRegistry::new(Arc::new(MemoryRegistryStore::new()), 3)),
            Arc::new(SelectionEngine::new(Duration::from_millis(10), 1)),
            Arc::new(SlidingWindowLimiter::new(Duration::from_secs(60))),
            Arc::new(SpecialSetCache::new(
                Arc::new(MemorySetStore::new()),
                "special",
            )),
            Arc::new(TrustedHosts::new(vec!["example.com".to_string()])),
            policy,
        )
    }

    async fn add_healthy_backend(d: &DirectorService, url: &str, load: u64) {
        let cdn = CdnUrl::new(url).unwrap();
        d.registry().register(&cdn).await.unwrap();
        d.registry()
            .record_probe(cdn.as_str(), ProbeOutcome::success(load))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_route_redirects_to_healthy_backend() {
        let d = director(policy());
        add_healthy_backend(&d, "http://cdn1.example.com", 2).await;

        let decision = d
            .route(ContentKind::Download, "abc", "movie.mkv", "1.2.3.4", None)
            .await
            .unwrap();
        assert_eq!(
            decision,
            RouteDecision::Redirect {
                location: "http://cdn1.example.com/dl/abc/movie.mkv".to_string(),
                status: 302,
            }
        );
    }

    #[tokio::test]
    async fn test_route_watch_without_tail_path() {
        let d = director(policy());
        add_healthy_backend(&d, "http://cdn1.example.com", 2).await;

        let decision = d
            .route(ContentKind::Watch, "abc", "", "1.2.3.4", None)
            .await
            .unwrap();
        assert_eq!(
            decision,
            RouteDecision::Redirect {
                location: "http://cdn1.example.com/watch/abc".to_string(),
                status: 302,
            }
        );
    }

    #[tokio::test]
    async fn test_route_unavailable_without_healthy_backend() {
        let d = director(policy());
        let decision = d
            .route(ContentKind::Download, "abc", "f", "1.2.3.4", None)
            .await
            .unwrap();
        assert_eq!(decision, RouteDecision::Unavailable);
    }

    #[tokio::test]
    async fn test_rate_limit_applies_after_threshold() {
        let d = director(policy());
        add_healthy_backend(&d, "http://cdn1.example.com", 2).await;

        for _ in 0..3 {
            let decision = d
                .route(ContentKind::Download, "abc", "f", "1.2.3.4", None)
                .await
                .unwrap();
            assert!(matches!(decision, RouteDecision::Redirect { .. }));
        }

        let decision = d
            .route(ContentKind::Download, "abc", "f", "1.2.3.4", None)
            .await
            .unwrap();
        assert_eq!(
            decision,
            RouteDecision::RateLimited {
                allowed: 3,
                observed: 4,
                window_seconds: 60,
            }
        );

        // A different client is unaffected.
        let decision = d
            .route(ContentKind::Download, "abc", "f", "5.6.7.8", None)
            .await
            .unwrap();
        assert!(matches!(decision, RouteDecision::Redirect { .. }));
    }

    #[tokio::test]
    async fn test_zero_limit_disables_limiting() {
        let d = director(DirectorPolicy {
            max_requests_per_ip: 0,
            ..policy()
        });
        add_healthy_backend(&d, "http://cdn1.example.com", 2).await;

        for _ in 0..50 {
            let decision = d
                .route(ContentKind::Download, "abc", "f", "1.2.3.4", None)
                .await
                .unwrap();
            assert!(matches!(decision, RouteDecision::Redirect { .. }));
        }
    }

    #[tokio::test]
    async fn test_special_hash_overrides_backend() {
        let d = director(policy());
        add_healthy_backend(&d, "http://cdn1.example.com", 2).await;
        d.special().add(&["abc".to_string()]).await.unwrap();

        let decision = d
            .route(ContentKind::Download, "abc", "movie.mkv", "1.2.3.4", None)
            .await
            .unwrap();
        assert_eq!(
            decision,
            RouteDecision::Override {
                location: "https://fallback.example.com/dl/abc/movie.mkv".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_blocked_referrer_overrides_backend() {
        let d = director(policy());
        add_healthy_backend(&d, "http://cdn1.example.com", 2).await;

        let decision = d
            .route(
                ContentKind::Watch,
                "abc",
                "",
                "1.2.3.4",
                Some("https://evil.example.org/embed"),
            )
            .await
            .unwrap();
        assert!(matches!(decision, RouteDecision::Override { .. }));

        let decision = d
            .route(
                ContentKind::Watch,
                "abc",
                "",
                "1.2.3.4",
                Some("https://video.example.com/embed"),
            )
            .await
            .unwrap();
        assert!(matches!(decision, RouteDecision::Redirect { .. }));
    }

    #[tokio::test]
    async fn test_proxy_delivery_mode() {
        let d = director(DirectorPolicy {
            delivery: DeliveryMode::Proxy,
            ..policy()
        });
        add_healthy_backend(&d, "http://cdn1.example.com", 2).await;

        let decision = d
            .route(ContentKind::Download, "abc", "f", "1.2.3.4", None)
            .await
            .unwrap();
        assert_eq!(
            decision,
            RouteDecision::Proxy {
                target: "http://cdn1.example.com/dl/abc/f".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_register_backends_applies_valid_items_independently() {
        let d = director(policy());
        let report = d
            .register_backends(&[
                "http://cdn1.example.com/".to_string(),
                "ftp://bad.example.com".to_string(),
                "http://cdn2.example.com".to_string(),
                "http://cdn1.example.com".to_string(), // duplicate of first
            ])
            .await
            .unwrap();

        assert_eq!(
            report.added,
            vec!["http://cdn1.example.com", "http://cdn2.example.com"]
        );
        assert_eq!(report.skipped.len(), 2);
        assert_eq!(report.total, 2);

        // Trust was rebuilt from the post-batch registry.
        assert!(d.trust().is_trusted_host("cdn1.example.com"));
        assert!(d.trust().is_trusted_host("cdn2.example.com"));
    }

    #[tokio::test]
    async fn test_stats_reports_components() {
        let d = director(policy());
        add_healthy_backend(&d, "http://cdn1.example.com", 2).await;
        d.route(ContentKind::Download, "abc", "f", "1.2.3.4", None)
            .await
            .unwrap();

        let stats = d.stats().await.unwrap();
        assert!(stats["servers"].get("http://cdn1.example.com").is_some());
        assert_eq!(stats["usage"]["abc"], 1);
        assert!(
            stats["trusted_hosts"]
                .as_array()
                .unwrap()
                .contains(&serde_json::Value::from("localhost"))
        );
    }
}
