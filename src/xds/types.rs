use crate::identity::types::NodeIdentity;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Type URLs of the resource kinds the driver subscribes to.
pub mod type_url {
    pub const LISTENER: &str = "type.googleapis.com/envoy.api.v2.Listener";
    pub const CLUSTER: &str = "type.googleapis.com/envoy.api.v2.Cluster";
    pub const ROUTE: &str = "type.googleapis.com/envoy.api.v2.RouteConfiguration";
    pub const ENDPOINT: &str = "type.googleapis.com/envoy.api.v2.ClusterLoadAssignment";
}

/// The node block attached to every discovery request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NodeDescriptor {
    pub id: String,
    pub cluster: String,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DiscoveryRequest {
    #[serde(default)]
    pub version_info: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<NodeDescriptor>,
    #[serde(default)]
    pub resource_names: Vec<String>,
    pub type_url: String,
    #[serde(default)]
    pub response_nonce: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl DiscoveryRequest {
    /// A wildcard subscription for `type_url`.
    pub fn subscribe(type_url: &str) -> Self {
        Self {
            type_url: type_url.to_string(),
            ..Default::default()
        }
    }

    /// A subscription for the named resources of `type_url`.
    pub fn subscribe_to(type_url: &str, resource_names: Vec<String>) -> Self {
        Self {
            type_url: type_url.to_string(),
            resource_names,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DiscoveryResponse {
    #[serde(default)]
    pub version_info: String,
    #[serde(default)]
    pub resources: Vec<Value>,
    pub type_url: String,
    #[serde(default)]
    pub nonce: String,
}

/// Everything a dialer needs to know about the node it connects for.
#[derive(Debug, Clone, PartialEq)]
pub struct AdsConfig {
    pub node: NodeDescriptor,
}

impl From<&NodeIdentity> for AdsConfig {
    fn from(identity: &NodeIdentity) -> Self {
        let metadata = serde_json::json!({
            "LABELS": identity.labels,
            "NAMESPACE": identity.namespace,
            "INSTANCE_IPS": identity.ip,
        });

        Self {
            node: NodeDescriptor {
                id: identity.service_node(),
                cluster: identity.workload.clone(),
                metadata,
            },
        }
    }
}
