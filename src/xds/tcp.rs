//! ADS stream over TCP.
//!
//! Each direction carries one JSON document per line: `DiscoveryRequest`s go
//! to the control plane, `DiscoveryResponse`s come back. Every response is
//! ACKed and fed to the session's [`ResourceCache`].

use super::cache::{Category, ResourceCache};
use super::session::{
    Dialed, Dialer, Session, SessionError, TerminationNotifier, TerminationReason,
    TerminationSignal,
};
use super::types::{AdsConfig, DiscoveryRequest, DiscoveryResponse, NodeDescriptor};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tokio_util::sync::CancellationToken;

const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

/// Dials plain TCP connections to the control plane.
#[derive(Debug, Clone, Default)]
pub struct TcpDialer;

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self, address: &str, config: &AdsConfig) -> Result<Dialed, SessionError> {
        let stream = TcpStream::connect(address).await?;
        stream.set_nodelay(true)?;

        tracing::debug!("Connected ADS stream for {} to {}", config.node.id, address);

        Ok(TcpSession::start(stream, config.node.clone()))
    }
}

/// State shared by the session handle and its reader and writer tasks.
struct Shared {
    node: NodeDescriptor,
    outbound: mpsc::UnboundedSender<DiscoveryRequest>,
    subscriptions: DashMap<String, Vec<String>>,
    cache: ResourceCache,
    notifier: Arc<TerminationNotifier>,
    shutdown: CancellationToken,
}

impl Shared {
    fn enqueue(&self, mut request: DiscoveryRequest) -> Result<(), SessionError> {
        if self.shutdown.is_cancelled() {
            return Err(SessionError::Closed);
        }

        if request.response_nonce.is_empty() {
            self.subscriptions
                .insert(request.type_url.clone(), request.resource_names.clone());
        }
        request.node = Some(self.node.clone());

        self.outbound
            .send(request)
            .map_err(|_| SessionError::Closed)
    }

    fn terminate(&self, reason: TerminationReason) {
        if self.notifier.notify(reason.clone()) {
            tracing::debug!("ADS stream for {} terminated: {}", self.node.id, reason);
        }
        self.shutdown.cancel();
    }

    fn handle_response(&self, response: DiscoveryResponse) {
        let follow_ups = self.cache.apply(&response);

        let ack = DiscoveryRequest {
            version_info: response.version_info.clone(),
            resource_names: self
                .subscriptions
                .get(&response.type_url)
                .map(|names| names.value().clone())
                .unwrap_or_default(),
            type_url: response.type_url.clone(),
            response_nonce: response.nonce.clone(),
            ..Default::default()
        };

        let requests = std::iter::once(ack).chain(follow_ups);
        for request in requests {
            if let Err(e) = self.enqueue(request) {
                tracing::debug!("Dropping request on stopped stream {}: {}", self.node.id, e);
                return;
            }
        }
    }
}

pub struct TcpSession {
    shared: Arc<Shared>,
}

impl TcpSession {
    /// Spawns the reader and writer tasks for `stream`.
    pub fn start(stream: TcpStream, node: NodeDescriptor) -> Dialed {
        let (read_half, write_half) = stream.into_split();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (notifier, termination) = TerminationSignal::channel();

        let shared = Arc::new(Shared {
            node,
            outbound,
            subscriptions: DashMap::new(),
            cache: ResourceCache::new(),
            notifier,
            shutdown: CancellationToken::new(),
        });

        tokio::spawn(write_loop(shared.clone(), write_half, outbound_rx));
        tokio::spawn(read_loop(shared.clone(), read_half));

        Dialed {
            session: Arc::new(TcpSession { shared }),
            termination,
        }
    }
}

#[async_trait]
impl Session for TcpSession {
    async fn send(&self, request: DiscoveryRequest) -> Result<(), SessionError> {
        self.shared.enqueue(request)
    }

    fn close(&self) {
        self.shared.terminate(TerminationReason::Closed);
    }

    fn http_listeners(&self) -> Value {
        self.shared.cache.get(Category::HttpListeners)
    }

    fn tcp_listeners(&self) -> Value {
        self.shared.cache.get(Category::TcpListeners)
    }

    fn clusters(&self) -> Value {
        self.shared.cache.get(Category::Clusters)
    }

    fn eds_clusters(&self) -> Value {
        self.shared.cache.get(Category::EdsClusters)
    }

    fn routes(&self) -> Value {
        self.shared.cache.get(Category::Routes)
    }

    fn endpoints(&self) -> Value {
        self.shared.cache.get(Category::Endpoints)
    }
}

impl Drop for TcpSession {
    fn drop(&mut self) {
        self.shared.terminate(TerminationReason::Closed);
    }
}

async fn write_loop(
    shared: Arc<Shared>,
    write_half: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<DiscoveryRequest>,
) {
    let mut sink = FramedWrite::new(write_half, LinesCodec::new());

    loop {
        let request = tokio::select! {
            _ = shared.shutdown.cancelled() => break,
            request = outbound.recv() => match request {
                Some(request) => request,
                None => break,
            },
        };

        let line = match serde_json::to_string(&request) {
            Ok(line) => line,
            Err(e) => {
                tracing::error!("Failed to encode discovery request: {}", e);
                continue;
            }
        };

        if let Err(e) = sink.send(line).await {
            shared.terminate(TerminationReason::Failed(e.to_string()));
            break;
        }
    }
}

async fn read_loop(shared: Arc<Shared>, read_half: OwnedReadHalf) {
    let mut stream =
        FramedRead::new(read_half, LinesCodec::new_with_max_length(MAX_FRAME_LENGTH));

    loop {
        let frame = tokio::select! {
            _ = shared.shutdown.cancelled() => break,
            frame = stream.next() => frame,
        };

        match frame {
            Some(Ok(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<DiscoveryResponse>(&line) {
                    Ok(response) => shared.handle_response(response),
                    Err(e) => {
                        tracing::warn!(
                            "Ignoring malformed discovery response for {}: {}",
                            shared.node.id,
                            e
                        );
                    }
                }
            }
            Some(Err(e)) => {
                shared.terminate(TerminationReason::Failed(e.to_string()));
                break;
            }
            None => {
                shared.terminate(TerminationReason::StreamEnded);
                break;
            }
        }
    }
}
