use crate::identity::types::NodeIdentity;
use crate::xds::session::Session;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Everything one node has learned from the control plane, captured at a
/// single point in time. Built per request and never updated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfigSnapshot {
    pub node: NodeIdentity,
    pub http_listeners: Value,
    pub tcp_listeners: Value,
    pub clusters: Value,
    #[serde(rename = "edsClusters")]
    pub eds_clusters: Value,
    pub routes: Value,
    pub endpoints: Value,
}

impl ConfigSnapshot {
    pub fn capture(node: &NodeIdentity, session: &dyn Session) -> Self {
        Self {
            node: node.clone(),
            http_listeners: session.http_listeners(),
            tcp_listeners: session.tcp_listeners(),
            clusters: session.clusters(),
            eds_clusters: session.eds_clusters(),
            routes: session.routes(),
            endpoints: session.endpoints(),
        }
    }
}
