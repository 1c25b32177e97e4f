//! Session contracts.
//!
//! A [`Dialer`] turns a control-plane address and an [`AdsConfig`] into a live
//! [`Session`] plus a [`TerminationSignal`]. The signal resolves exactly once,
//! when the session stops for any reason, and carries a typed
//! [`TerminationReason`].

use super::types::{AdsConfig, DiscoveryRequest};

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::oneshot;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),

    #[error("session is closed")]
    Closed,
}

/// Why a session stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    /// `Session::close` was called.
    Closed,
    /// The control plane ended the stream.
    StreamEnded,
    /// The stream failed with a transport or framing error.
    Failed(String),
    /// The session went away without reporting a reason.
    Dropped,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::Closed => f.write_str("closed"),
            TerminationReason::StreamEnded => f.write_str("stream ended by control plane"),
            TerminationReason::Failed(e) => write!(f, "stream failed: {}", e),
            TerminationReason::Dropped => f.write_str("session dropped"),
        }
    }
}

/// Sending half of a termination signal. Only the first `notify` is delivered.
#[derive(Debug)]
pub struct TerminationNotifier {
    tx: Mutex<Option<oneshot::Sender<TerminationReason>>>,
}

impl TerminationNotifier {
    /// Delivers `reason` if nothing was delivered before. Returns whether this
    /// call was the one that fired.
    pub fn notify(&self, reason: TerminationReason) -> bool {
        let tx = match self.tx.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        match tx {
            Some(tx) => {
                let _ = tx.send(reason);
                true
            }
            None => false,
        }
    }
}

/// Receiving half of a termination signal.
#[derive(Debug)]
pub struct TerminationSignal {
    rx: oneshot::Receiver<TerminationReason>,
}

impl TerminationSignal {
    pub fn channel() -> (Arc<TerminationNotifier>, TerminationSignal) {
        let (tx, rx) = oneshot::channel();
        (
            Arc::new(TerminationNotifier {
                tx: Mutex::new(Some(tx)),
            }),
            TerminationSignal { rx },
        )
    }

    /// Waits until the session terminates.
    pub async fn wait(self) -> TerminationReason {
        self.rx.await.unwrap_or(TerminationReason::Dropped)
    }
}

/// One live stream between a node and the control plane.
///
/// The category accessors return the most recent configuration received, as a
/// JSON object keyed by resource name. They never block.
#[async_trait]
pub trait Session: Send + Sync {
    async fn send(&self, request: DiscoveryRequest) -> Result<(), SessionError>;

    fn close(&self);

    fn http_listeners(&self) -> Value;
    fn tcp_listeners(&self) -> Value;
    fn clusters(&self) -> Value;
    fn eds_clusters(&self) -> Value;
    fn routes(&self) -> Value;
    fn endpoints(&self) -> Value;
}

/// A freshly established session and the signal that reports its end.
pub struct Dialed {
    pub session: Arc<dyn Session>,
    pub termination: TerminationSignal,
}

/// Opens sessions against a control plane.
///
/// No timeout is imposed by callers; an implementation that wants bounded
/// connection attempts must enforce it itself.
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    async fn dial(&self, address: &str, config: &AdsConfig) -> Result<Dialed, SessionError>;
}
