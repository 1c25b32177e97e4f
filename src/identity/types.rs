use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

const DEFAULT_NODE_KIND: &str = "sidecar";
const DEFAULT_NAMESPACE: &str = "default";
const DEFAULT_VERSION: &str = "v1";
const WORKLOAD_PREFIX: &str = "fake-workload-";

/// Unique key of a simulated client inside the registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The descriptor a simulated client presents to the control plane.
///
/// Serialized as the `node` field of every config dump entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeIdentity {
    pub id: NodeId,
    pub workload: String,
    pub namespace: String,
    #[serde(rename = "nodetype")]
    pub kind: String,
    pub ip: String,
    pub labels: BTreeMap<String, String>,
}

impl NodeIdentity {
    /// Builds a sidecar identity in the default namespace with a unique workload
    /// name, a pod-range IP and a fresh id.
    pub fn random() -> Self {
        let workload = format!("{}{}", WORKLOAD_PREFIX, uuid::Uuid::new_v4());

        let mut labels = BTreeMap::new();
        labels.insert("version".to_string(), DEFAULT_VERSION.to_string());
        labels.insert("app".to_string(), workload.clone());

        Self {
            id: NodeId::new(),
            workload,
            namespace: DEFAULT_NAMESPACE.to_string(),
            kind: DEFAULT_NODE_KIND.to_string(),
            ip: random_pod_ip(),
            labels,
        }
    }

    /// Assigns a fresh id when none is present. Existing ids are kept so the
    /// identity stays addressable across reconnects.
    pub fn ensure_id(&mut self) -> &NodeId {
        if self.id.is_empty() {
            self.id = NodeId::new();
        }
        &self.id
    }

    /// The node id string announced on the wire, in the sidecar
    /// `kind~ip~workload.namespace~namespace.svc.cluster.local` form.
    pub fn service_node(&self) -> String {
        format!(
            "{}~{}~{}.{}~{}.svc.cluster.local",
            self.kind, self.ip, self.workload, self.namespace, self.namespace
        )
    }
}

fn random_pod_ip() -> String {
    let mut rng = rand::thread_rng();
    format!(
        "10.{}.{}.{}",
        rng.gen_range(0..=255u8),
        rng.gen_range(0..=255u8),
        rng.gen_range(1..=254u8)
    )
}
