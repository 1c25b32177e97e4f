//! Client Registry
//!
//! Maps node ids to their live protocol session. All reads and writes of the
//! map go through one `RwLock`, so a snapshot sees every entry either complete
//! or not at all.
//!
//! Every registered session gets a watcher task. When the session's termination
//! signal fires, the watcher removes the entry and then turns into the reconnect
//! loop for that node, dialing every `retry_interval` until a new session is
//! registered. The registry's shutdown token stops watchers and reconnect loops,
//! and is checked under the write lock before any insert, so nothing is
//! registered once `close` has run.

use super::error::DriverError;
use super::types::ConfigSnapshot;
use crate::config::DriverConfig;
use crate::identity::types::{NodeId, NodeIdentity};
use crate::xds::session::{Dialed, Dialer, Session, TerminationSignal};
use crate::xds::types::{AdsConfig, DiscoveryRequest};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

struct ClientEntry {
    identity: NodeIdentity,
    session: Arc<dyn Session>,
    /// Distinguishes successive sessions of the same node, so a watcher never
    /// removes a session it was not started for.
    generation: u64,
}

pub struct ClientRegistry {
    control_plane_address: String,
    retry_interval: Duration,
    dialer: Arc<dyn Dialer>,
    clients: RwLock<HashMap<NodeId, ClientEntry>>,
    next_generation: AtomicU64,
    shutdown: CancellationToken,
}

impl ClientRegistry {
    pub fn new(
        control_plane_address: impl Into<String>,
        retry_interval: Duration,
        dialer: Arc<dyn Dialer>,
    ) -> Arc<Self> {
        Arc::new(Self {
            control_plane_address: control_plane_address.into(),
            retry_interval,
            dialer,
            clients: RwLock::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn from_config(config: &DriverConfig, dialer: Arc<dyn Dialer>) -> Arc<Self> {
        Self::new(
            config.control_plane_address.clone(),
            config.retry_interval,
            dialer,
        )
    }

    /// Connects a new client for `identity` and registers it.
    ///
    /// An id is assigned if the identity has none. On dial failure the error is
    /// returned and the registry is left untouched.
    pub async fn add_client(
        self: &Arc<Self>,
        mut identity: NodeIdentity,
    ) -> Result<NodeId, DriverError> {
        if self.shutdown.is_cancelled() {
            return Err(DriverError::Closed);
        }

        let id = identity.ensure_id().clone();
        if self.contains(&id).await {
            return Err(DriverError::AlreadyRegistered(id));
        }

        self.connect(identity).await?;

        tracing::info!("Added client {}", id);
        Ok(id)
    }

    /// Forwards `request` to the session of node `id`.
    ///
    /// The session's own error is returned unchanged; a failed send does not
    /// remove the client.
    pub async fn send_request(
        &self,
        id: &NodeId,
        request: DiscoveryRequest,
    ) -> Result<(), DriverError> {
        let session = {
            let clients = self.clients.read().await;
            clients.get(id).map(|entry| entry.session.clone())
        };

        let session = session.ok_or_else(|| DriverError::NotFound(id.clone()))?;
        session.send(request).await?;

        Ok(())
    }

    /// One snapshot per registered client, in no particular order.
    pub async fn snapshot(&self) -> Vec<ConfigSnapshot> {
        let clients = self.clients.read().await;

        clients
            .values()
            .map(|entry| ConfigSnapshot::capture(&entry.identity, entry.session.as_ref()))
            .collect()
    }

    /// Closes every registered session and stops all reconnect loops.
    pub async fn close(&self) {
        let drained: Vec<ClientEntry> = {
            let mut clients = self.clients.write().await;
            self.shutdown.cancel();
            clients.drain().map(|(_, entry)| entry).collect()
        };

        for entry in &drained {
            entry.session.close();
        }

        tracing::info!("Client registry closed ({} sessions)", drained.len());
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }

    pub async fn contains(&self, id: &NodeId) -> bool {
        self.clients.read().await.contains_key(id)
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Dials a session for `identity`, registers it and starts its watcher.
    async fn connect(self: &Arc<Self>, identity: NodeIdentity) -> Result<(), DriverError> {
        let config = AdsConfig::from(&identity);
        let Dialed {
            session,
            termination,
        } = self
            .dialer
            .dial(&self.control_plane_address, &config)
            .await
            .map_err(|source| DriverError::Dial {
                id: identity.id.clone(),
                source,
            })?;

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let id = identity.id.clone();

        {
            let mut clients = self.clients.write().await;

            if self.shutdown.is_cancelled() {
                session.close();
                return Err(DriverError::Closed);
            }
            if clients.contains_key(&id) {
                session.close();
                return Err(DriverError::AlreadyRegistered(id));
            }

            clients.insert(
                id,
                ClientEntry {
                    identity: identity.clone(),
                    session,
                    generation,
                },
            );
        }

        self.spawn_watcher(identity, generation, termination);
        Ok(())
    }

    fn spawn_watcher(
        self: &Arc<Self>,
        identity: NodeIdentity,
        generation: u64,
        termination: TerminationSignal,
    ) {
        let registry = self.clone();
        tokio::spawn(async move {
            registry.watch(identity, generation, termination).await;
        });
    }

    /// Waits for the session to end, unregisters it and reconnects.
    async fn watch(
        self: Arc<Self>,
        identity: NodeIdentity,
        generation: u64,
        termination: TerminationSignal,
    ) {
        let reason = tokio::select! {
            _ = self.shutdown.cancelled() => return,
            reason = termination.wait() => reason,
        };

        let stale = {
            let mut clients = self.clients.write().await;
            let current = clients
                .get(&identity.id)
                .is_some_and(|entry| entry.generation == generation);

            if current {
                clients.remove(&identity.id)
            } else {
                None
            }
        };

        let Some(stale) = stale else {
            tracing::debug!(
                "Session {} of client {} ended after being replaced: {}",
                generation,
                identity.id,
                reason
            );
            return;
        };
        stale.session.close();
        drop(stale);

        if self.shutdown.is_cancelled() {
            return;
        }

        tracing::warn!("Client {} disconnected ({}), reconnecting", identity.id, reason);
        self.reconnect(identity).await;
    }

    /// Dials until a session for `identity` is registered or the registry closes.
    async fn reconnect(self: &Arc<Self>, identity: NodeIdentity) {
        let mut attempt: u64 = 0;

        loop {
            attempt += 1;

            let result = tokio::select! {
                _ = self.shutdown.cancelled() => return,
                result = self.connect(identity.clone()) => result,
            };

            match result {
                Ok(()) => {
                    tracing::info!(
                        "Reconnected client {} after {} attempt(s)",
                        identity.id,
                        attempt
                    );
                    return;
                }
                Err(DriverError::Closed) => return,
                Err(DriverError::AlreadyRegistered(id)) => {
                    tracing::debug!("Client {} was registered elsewhere, stop reconnecting", id);
                    return;
                }
                Err(e) => {
                    tracing::debug!(
                        "Reconnect attempt {} for client {} failed: {}",
                        attempt,
                        identity.id,
                        e
                    );
                }
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                _ = tokio::time::sleep(self.retry_interval) => {}
            }
        }
    }
}
