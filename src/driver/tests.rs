//! Driver Module Tests
//!
//! Exercises the client registry against an in-memory dialer whose sessions can
//! be terminated on demand and whose dials can be made to fail.
//!
//! ## Test Scopes
//! - **Registration**: add, id assignment, dial failures, duplicates.
//! - **Requests**: forwarding, unknown ids, send failures.
//! - **Reconnection**: removal on termination, retry until success, same id after reconnect.
//! - **Shutdown**: close semantics and no resurrection by in-flight reconnects.
//! - **Snapshots**: completeness under concurrent mutation.
//! - **Bootstrap**: the startup subscription sequence.

#[cfg(test)]
mod tests {
    use crate::driver::bootstrap::start_clients;
    use crate::driver::error::DriverError;
    use crate::driver::registry::ClientRegistry;
    use crate::identity::types::{NodeId, NodeIdentity};
    use crate::xds::session::{
        Dialed, Dialer, Session, SessionError, TerminationNotifier, TerminationReason,
        TerminationSignal,
    };
    use crate::xds::types::{type_url, AdsConfig, DiscoveryRequest};

    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::{BTreeMap, HashSet};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    const RETRY_INTERVAL: Duration = Duration::from_millis(5);

    // ============================================================
    // FAKE SESSIONS
    // ============================================================

    struct FakeSession {
        node: String,
        sent: Mutex<Vec<DiscoveryRequest>>,
        fail_sends: AtomicBool,
        closed: AtomicBool,
        notifier: Arc<TerminationNotifier>,
    }

    impl FakeSession {
        fn terminate(&self) {
            self.notifier.notify(TerminationReason::StreamEnded);
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }

        fn sent_type_urls(&self) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.type_url.clone())
                .collect()
        }

        fn category(&self, name: &str) -> Value {
            let mut category = serde_json::Map::new();
            category.insert(name.to_string(), json!({ "node": self.node }));
            Value::Object(category)
        }
    }

    #[async_trait]
    impl Session for FakeSession {
        async fn send(&self, request: DiscoveryRequest) -> Result<(), SessionError> {
            if self.is_closed() {
                return Err(SessionError::Closed);
            }
            if self.fail_sends.load(Ordering::SeqCst) {
                return Err(SessionError::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "broken pipe",
                )));
            }
            self.sent.lock().unwrap().push(request);
            Ok(())
        }

        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
            self.notifier.notify(TerminationReason::Closed);
        }

        fn http_listeners(&self) -> Value {
            self.category("http")
        }

        fn tcp_listeners(&self) -> Value {
            self.category("tcp")
        }

        fn clusters(&self) -> Value {
            self.category("cluster")
        }

        fn eds_clusters(&self) -> Value {
            self.category("eds")
        }

        fn routes(&self) -> Value {
            self.category("route")
        }

        fn endpoints(&self) -> Value {
            self.category("endpoint")
        }
    }

    #[derive(Default)]
    struct FakeDialer {
        failing: AtomicBool,
        attempts: AtomicUsize,
        sessions: Mutex<Vec<Arc<FakeSession>>>,
    }

    impl FakeDialer {
        fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }

        fn session(&self, index: usize) -> Arc<FakeSession> {
            self.sessions.lock().unwrap()[index].clone()
        }

        fn session_count(&self) -> usize {
            self.sessions.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Dialer for FakeDialer {
        async fn dial(&self, _address: &str, config: &AdsConfig) -> Result<Dialed, SessionError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);

            if self.failing.load(Ordering::SeqCst) {
                return Err(SessionError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "connection refused",
                )));
            }

            let (notifier, termination) = TerminationSignal::channel();
            let session = Arc::new(FakeSession {
                node: config.node.id.clone(),
                sent: Mutex::new(Vec::new()),
                fail_sends: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                notifier,
            });
            self.sessions.lock().unwrap().push(session.clone());

            Ok(Dialed {
                session,
                termination,
            })
        }
    }

    fn registry(dialer: &Arc<FakeDialer>) -> Arc<ClientRegistry> {
        ClientRegistry::new("pilot.fake:15010", RETRY_INTERVAL, dialer.clone())
    }

    async fn wait_for_len(registry: &ClientRegistry, expected: usize) {
        let result = tokio::time::timeout(Duration::from_secs(5), async {
            while registry.len().await != expected {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await;

        assert!(
            result.is_ok(),
            "registry never reached {} entries (has {})",
            expected,
            registry.len().await
        );
    }

    async fn wait_for_attempts(dialer: &FakeDialer, expected: usize) {
        let result = tokio::time::timeout(Duration::from_secs(5), async {
            while dialer.attempts() < expected {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await;

        assert!(result.is_ok(), "dialer never reached {} attempts", expected);
    }

    async fn snapshot_ids(registry: &ClientRegistry) -> HashSet<NodeId> {
        registry
            .snapshot()
            .await
            .into_iter()
            .map(|s| s.node.id)
            .collect()
    }

    // ============================================================
    // REGISTRATION
    // ============================================================

    #[tokio::test]
    async fn test_added_clients_appear_in_snapshot() {
        let dialer = FakeDialer::new();
        let registry = registry(&dialer);

        let mut added = HashSet::new();
        for _ in 0..3 {
            added.insert(registry.add_client(NodeIdentity::random()).await.unwrap());
        }

        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot_ids(&registry).await, added);
    }

    #[tokio::test]
    async fn test_add_client_assigns_missing_id() {
        let dialer = FakeDialer::new();
        let registry = registry(&dialer);

        let mut identity = NodeIdentity::random();
        identity.id = NodeId::default();

        let id = registry.add_client(identity).await.unwrap();

        assert!(!id.is_empty());
        assert!(registry.contains(&id).await);
    }

    #[tokio::test]
    async fn test_add_client_dial_failure_leaves_registry_unchanged() {
        let dialer = FakeDialer::new();
        let registry = registry(&dialer);
        registry.add_client(NodeIdentity::random()).await.unwrap();

        dialer.set_failing(true);
        let identity = NodeIdentity::random();
        let id = identity.id.clone();
        let result = registry.add_client(identity).await;

        assert!(matches!(result, Err(DriverError::Dial { .. })));
        assert_eq!(registry.len().await, 1);
        assert!(!registry.contains(&id).await);
    }

    #[tokio::test]
    async fn test_add_client_rejects_duplicate_id() {
        let dialer = FakeDialer::new();
        let registry = registry(&dialer);
        let identity = NodeIdentity::random();

        registry.add_client(identity.clone()).await.unwrap();
        let result = registry.add_client(identity).await;

        assert!(matches!(result, Err(DriverError::AlreadyRegistered(_))));
        assert_eq!(registry.len().await, 1);
        assert_eq!(dialer.session_count(), 1);
    }

    // ============================================================
    // REQUESTS
    // ============================================================

    #[tokio::test]
    async fn test_send_request_forwards_to_session() {
        let dialer = FakeDialer::new();
        let registry = registry(&dialer);
        let id = registry.add_client(NodeIdentity::random()).await.unwrap();

        registry
            .send_request(&id, DiscoveryRequest::subscribe(type_url::CLUSTER))
            .await
            .unwrap();

        assert_eq!(dialer.session(0).sent_type_urls(), vec![type_url::CLUSTER]);
    }

    #[tokio::test]
    async fn test_send_request_unknown_id_is_not_found() {
        let dialer = FakeDialer::new();
        let registry = registry(&dialer);
        registry.add_client(NodeIdentity::random()).await.unwrap();

        let result = registry
            .send_request(
                &NodeId("unknown-id".to_string()),
                DiscoveryRequest::subscribe(type_url::CLUSTER),
            )
            .await;

        assert!(matches!(result, Err(DriverError::NotFound(id)) if id.0 == "unknown-id"));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_send_failure_is_returned_and_client_kept() {
        let dialer = FakeDialer::new();
        let registry = registry(&dialer);
        let id = registry.add_client(NodeIdentity::random()).await.unwrap();
        dialer.session(0).fail_sends.store(true, Ordering::SeqCst);

        let result = registry
            .send_request(&id, DiscoveryRequest::subscribe(type_url::LISTENER))
            .await;

        assert!(matches!(result, Err(DriverError::Session(SessionError::Io(_)))));
        assert!(registry.contains(&id).await);
    }

    // ============================================================
    // RECONNECTION
    // ============================================================

    #[tokio::test]
    async fn test_terminated_client_is_removed_then_reconnected_under_same_id() {
        let dialer = FakeDialer::new();
        let registry = registry(&dialer);

        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(registry.add_client(NodeIdentity::random()).await.unwrap());
        }

        dialer.set_failing(true);
        let attempts_before = dialer.attempts();
        dialer.session(1).terminate();

        wait_for_len(&registry, 2).await;
        assert!(!snapshot_ids(&registry).await.contains(&ids[1]));

        // Failed reconnects keep retrying without surfacing anywhere.
        wait_for_attempts(&dialer, attempts_before + 3).await;
        assert_eq!(registry.len().await, 2);
        assert!(dialer.session(1).is_closed());

        dialer.set_failing(false);
        wait_for_len(&registry, 3).await;

        let snapshot = snapshot_ids(&registry).await;
        assert_eq!(snapshot, ids.iter().cloned().collect());
        assert_eq!(dialer.session_count(), 4);
    }

    #[tokio::test]
    async fn test_reconnected_session_is_watched_again() {
        let dialer = FakeDialer::new();
        let registry = registry(&dialer);
        let id = registry.add_client(NodeIdentity::random()).await.unwrap();

        dialer.session(0).terminate();
        wait_for_attempts(&dialer, 2).await;
        wait_for_len(&registry, 1).await;

        dialer.session(1).terminate();
        wait_for_attempts(&dialer, 3).await;
        wait_for_len(&registry, 1).await;

        assert!(registry.contains(&id).await);
        registry
            .send_request(&id, DiscoveryRequest::subscribe(type_url::CLUSTER))
            .await
            .unwrap();
        assert_eq!(dialer.session(2).sent_type_urls(), vec![type_url::CLUSTER]);
    }

    // ============================================================
    // SHUTDOWN
    // ============================================================

    #[tokio::test]
    async fn test_close_closes_sessions_and_fails_later_sends() {
        let dialer = FakeDialer::new();
        let registry = registry(&dialer);
        let a = registry.add_client(NodeIdentity::random()).await.unwrap();
        let b = registry.add_client(NodeIdentity::random()).await.unwrap();

        registry.close().await;

        assert!(registry.is_closed());
        assert!(registry.is_empty().await);
        assert!(dialer.session(0).is_closed());
        assert!(dialer.session(1).is_closed());

        for id in [&a, &b] {
            let result = registry
                .send_request(id, DiscoveryRequest::subscribe(type_url::CLUSTER))
                .await;
            assert!(result.is_err());
        }

        // Closing sessions must not start reconnects.
        tokio::time::sleep(RETRY_INTERVAL * 4).await;
        assert_eq!(dialer.attempts(), 2);
    }

    #[tokio::test]
    async fn test_add_client_after_close_fails() {
        let dialer = FakeDialer::new();
        let registry = registry(&dialer);
        registry.close().await;

        let result = registry.add_client(NodeIdentity::random()).await;

        assert!(matches!(result, Err(DriverError::Closed)));
        assert_eq!(dialer.attempts(), 0);
    }

    #[tokio::test]
    async fn test_close_stops_pending_reconnects() {
        let dialer = FakeDialer::new();
        let registry = registry(&dialer);
        registry.add_client(NodeIdentity::random()).await.unwrap();

        dialer.set_failing(true);
        dialer.session(0).terminate();
        wait_for_len(&registry, 0).await;
        wait_for_attempts(&dialer, 3).await;

        registry.close().await;
        dialer.set_failing(false);
        let attempts_at_close = dialer.attempts();

        tokio::time::sleep(RETRY_INTERVAL * 10).await;

        assert!(registry.is_empty().await);
        assert!(dialer.attempts() <= attempts_at_close + 1);
        for index in 1..dialer.session_count() {
            assert!(dialer.session(index).is_closed());
        }
    }

    // ============================================================
    // SNAPSHOTS
    // ============================================================

    #[tokio::test]
    async fn test_snapshot_entries_carry_all_categories() {
        let dialer = FakeDialer::new();
        let registry = registry(&dialer);
        let id = registry.add_client(NodeIdentity::random()).await.unwrap();

        let snapshot = registry.snapshot().await;
        let entry = &snapshot[0];

        assert_eq!(entry.node.id, id);
        assert!(entry.http_listeners["http"].is_object());
        assert!(entry.tcp_listeners["tcp"].is_object());
        assert!(entry.clusters["cluster"].is_object());
        assert!(entry.eds_clusters["eds"].is_object());
        assert!(entry.routes["route"].is_object());
        assert!(entry.endpoints["endpoint"].is_object());

        let json = serde_json::to_value(&snapshot).unwrap();
        assert!(json[0].get("edsClusters").is_some());
        assert!(json[0].get("http_listeners").is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_snapshots_never_see_partial_entries() {
        let dialer = FakeDialer::new();
        let registry = registry(&dialer);

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move {
                    for _ in 0..200 {
                        for entry in registry.snapshot().await {
                            assert!(!entry.node.id.is_empty());
                            for category in [
                                &entry.http_listeners,
                                &entry.tcp_listeners,
                                &entry.clusters,
                                &entry.eds_clusters,
                                &entry.routes,
                                &entry.endpoints,
                            ] {
                                assert!(category.is_object());
                            }
                        }
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        let mut ids = Vec::new();
        for i in 0..20 {
            ids.push(registry.add_client(NodeIdentity::random()).await.unwrap());
            if i % 3 == 0 {
                dialer.session(i).terminate();
            }
        }

        for reader in readers {
            reader.await.unwrap();
        }

        wait_for_len(&registry, 20).await;
        let unique: HashSet<NodeId> = snapshot_ids(&registry).await;
        assert_eq!(unique.len(), 20);
        assert_eq!(unique, ids.into_iter().collect());
    }

    // ============================================================
    // BOOTSTRAP
    // ============================================================

    #[tokio::test]
    async fn test_start_clients_subscribes_clusters_then_listeners() {
        let dialer = FakeDialer::new();
        let registry = registry(&dialer);

        let ids = start_clients(&registry, 3).await.unwrap();

        assert_eq!(ids.len(), 3);
        assert_eq!(registry.len().await, 3);
        for index in 0..3 {
            assert_eq!(
                dialer.session(index).sent_type_urls(),
                vec![type_url::CLUSTER, type_url::LISTENER]
            );
        }
    }

    #[tokio::test]
    async fn test_start_clients_aborts_on_dial_failure() {
        let dialer = FakeDialer::new();
        dialer.set_failing(true);
        let registry = registry(&dialer);

        let result = start_clients(&registry, 2).await;

        assert!(result.is_err());
        assert!(registry.is_empty().await);
        assert_eq!(dialer.attempts(), 1);
    }

    #[test]
    fn test_identity_labels_reach_ads_metadata() {
        let mut labels = BTreeMap::new();
        labels.insert("app".to_string(), "ratings".to_string());
        let identity = NodeIdentity {
            id: NodeId("n1".to_string()),
            workload: "ratings".to_string(),
            namespace: "shop".to_string(),
            kind: "sidecar".to_string(),
            ip: "10.0.0.9".to_string(),
            labels,
        };

        let config = AdsConfig::from(&identity);

        assert_eq!(config.node.id, "sidecar~10.0.0.9~ratings.shop~shop.svc.cluster.local");
        assert_eq!(config.node.cluster, "ratings");
        assert_eq!(config.node.metadata["LABELS"]["app"], "ratings");
        assert_eq!(config.node.metadata["NAMESPACE"], "shop");
    }
}
