// Integration tests for the backend lifecycle: registration, polling,
// selection, eviction and recovery of the empty state.
#[cfg(test)]
mod tests {
    use std::{
        collections::HashSet,
        sync::Arc,
        time::Duration,
    };

    use async_trait::async_trait;
    use axum::body::Body as AxumBody;
    use cdn_director::{
        adapters::{
            HealthPoller,
            memory_store::{MemoryRegistryStore, MemorySetStore},
        },
        core::{
            CdnRegistry, DirectorService, SelectionEngine, SlidingWindowLimiter, SpecialSetCache,
            TrustedHosts,
            director::{ContentKind, DeliveryMode, DirectorPolicy, RouteDecision},
        },
        ports::{
            http_client::{HttpClient, HttpClientError, HttpClientResult},
            leadership::StaticLeader,
        },
    };
    use hyper::{Request, Response};

    /// Probe client returning a canned status (or failure) per backend.
    struct ScriptedClient {
        statuses: scc::HashMap<String, Option<serde_json::Value>>,
    }

    impl ScriptedClient {
        fn new() -> Self {
            Self {
                statuses: scc::HashMap::new(),
            }
        }

        fn set(&self, url: &str, status: Option<serde_json::Value>) {
            let key = format!("{url}/status");
            if self.statuses.insert_sync(key.clone(), status.clone()).is_err() {
                self.statuses.update_sync(&key, |_, v| *v = status.clone());
            }
        }
    }

    #[async_trait]
    impl HttpClient for ScriptedClient {
        async fn send_request(
            &self,
            _req: Request<AxumBody>,
        ) -> HttpClientResult<Response<AxumBody>> {
            Err(HttpClientError::ConnectionError(
                "not used in tests".to_string(),
            ))
        }

        async fn fetch_status(
            &self,
            url: &str,
            _timeout_secs: u64,
        ) -> HttpClientResult<serde_json::Value> {
            match self.statuses.get_sync(&url.to_string()).map(|e| e.get().clone()) {
                Some(Some(status)) => Ok(status),
                _ => Err(HttpClientError::ConnectionError(
                    "scripted failure".to_string(),
                )),
            }
        }
    }

    fn build_director(fail_threshold: u32) -> Arc<DirectorService> {
        Arc::new(DirectorService::new(
            Arc::new(CdnRegistry::new(
                Arc::new(MemoryRegistryStore::new()),
                fail_threshold,
            )),
            // Zero TTL: every selection recomputes from the live registry.
            Arc::new(SelectionEngine::new(Duration::from_millis(0), 1)),
            Arc::new(SlidingWindowLimiter::new(Duration::from_secs(60))),
            Arc::new(SpecialSetCache::new(
                Arc::new(MemorySetStore::new()),
                "special",
            )),
            Arc::new(TrustedHosts::new(vec![])),
            DirectorPolicy {
                max_requests_per_ip: 0,
                window_seconds: 60,
                redirect_code: 302,
                delivery: DeliveryMode::Redirect,
                override_destination: "https://fallback.example.com".to_string(),
            },
        ))
    }

    fn build_poller(
        director: Arc<DirectorService>,
        client: Arc<ScriptedClient>,
    ) -> HealthPoller {
        HealthPoller::new(
            director,
            client,
            Arc::new(StaticLeader(true)),
            Duration::from_secs(10),
            4,
            8,
        )
    }

    async fn redirect_host(director: &DirectorService) -> Option<String> {
        match director
            .route(ContentKind::Download, "abc", "file", "1.2.3.4", None)
            .await
            .unwrap()
        {
            RouteDecision::Redirect { location, .. } => Some(location),
            RouteDecision::Unavailable => None,
            other => panic!("unexpected decision: {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_backend_lifecycle_from_registration_to_empty() {
        let director = build_director(2);
        let client = Arc::new(ScriptedClient::new());
        let poller = build_poller(director.clone(), client.clone());

        // Register two backends and bring them up with close loads.
        let report = director
            .register_backends(&[
                "http://cdn-a.example.com".to_string(),
                "http://cdn-b.example.com".to_string(),
            ])
            .await
            .unwrap();
        assert_eq!(report.total, 2);

        client.set(
            "http://cdn-a.example.com",
            Some(serde_json::json!({"loads": {"disk": 1}})),
        );
        client.set(
            "http://cdn-b.example.com",
            Some(serde_json::json!({"loads": {"disk": 2}})),
        );
        poller.cycle().await.unwrap();

        // Both fall inside the tolerance band, so repeated selections spread
        // across both backends.
        let mut seen = HashSet::new();
        for _ in 0..40 {
            seen.insert(redirect_host(&director).await.unwrap());
        }
        assert_eq!(seen.len(), 2, "expected both backends to serve: {seen:?}");

        // Backend A goes dark. The first failing cycle marks it unhealthy,
        // so only B serves traffic.
        client.set("http://cdn-a.example.com", None);
        poller.cycle().await.unwrap();

        let entry = director
            .registry()
            .get("http://cdn-a.example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(!entry.healthy);
        for _ in 0..10 {
            let location = redirect_host(&director).await.unwrap();
            assert!(location.starts_with("http://cdn-b.example.com"));
        }

        // The second failing cycle crosses the threshold: A is evicted.
        poller.cycle().await.unwrap();
        assert!(
            director
                .registry()
                .get("http://cdn-a.example.com")
                .await
                .unwrap()
                .is_none()
        );
        assert!(!director.trust().is_trusted_host("cdn-a.example.com"));

        // B goes dark too: after eviction the registry is empty and requests
        // see no backend at all.
        client.set("http://cdn-b.example.com", None);
        poller.cycle().await.unwrap();
        poller.cycle().await.unwrap();

        assert!(director.registry().list().await.unwrap().is_empty());
        assert_eq!(redirect_host(&director).await, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_recovery_resets_failure_count() {
        let director = build_director(3);
        let client = Arc::new(ScriptedClient::new());
        let poller = build_poller(director.clone(), client.clone());

        director
            .register_backends(&["http://cdn-a.example.com".to_string()])
            .await
            .unwrap();

        // Two failing cycles leave the backend one short of eviction.
        client.set("http://cdn-a.example.com", None);
        poller.cycle().await.unwrap();
        poller.cycle().await.unwrap();

        let entry = director
            .registry()
            .get("http://cdn-a.example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.fail_count, 2);

        // One successful probe wipes the slate clean.
        client.set(
            "http://cdn-a.example.com",
            Some(serde_json::json!({"loads": {"disk": 7}})),
        );
        poller.cycle().await.unwrap();

        let entry = director
            .registry()
            .get("http://cdn-a.example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(entry.healthy);
        assert_eq!(entry.fail_count, 0);
        assert_eq!(entry.load, 7);

        // Two more failures still do not reach the threshold of three.
        client.set("http://cdn-a.example.com", None);
        poller.cycle().await.unwrap();
        poller.cycle().await.unwrap();
        assert!(
            director
                .registry()
                .get("http://cdn-a.example.com")
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_duplicate_pollers_converge() {
        // Two leader pollers over the same registry: probe writes are
        // last-writer-wins per backend, so duplicated cycles must not
        // double-count failures into premature eviction.
        let director = build_director(3);
        let client = Arc::new(ScriptedClient::new());
        let poller_one = build_poller(director.clone(), client.clone());
        let poller_two = build_poller(director.clone(), client.clone());

        director
            .register_backends(&["http://cdn-a.example.com".to_string()])
            .await
            .unwrap();
        client.set(
            "http://cdn-a.example.com",
            Some(serde_json::json!({"loads": {"disk": 4}})),
        );

        poller_one.cycle().await.unwrap();
        poller_two.cycle().await.unwrap();

        let entry = director
            .registry()
            .get("http://cdn-a.example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(entry.healthy);
        assert_eq!(entry.load, 4);
        assert_eq!(entry.fail_count, 0);
    }
}
