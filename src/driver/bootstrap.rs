//! Startup sequence: create the configured number of clients and subscribe
//! each of them to clusters and listeners.

use super::registry::ClientRegistry;
use crate::identity::types::{NodeId, NodeIdentity};
use crate::xds::types::{type_url, DiscoveryRequest};

use anyhow::{Context, Result};
use std::sync::Arc;

/// Adds `count` random clients one after another. The first failure aborts
/// the sequence.
pub async fn start_clients(registry: &Arc<ClientRegistry>, count: usize) -> Result<Vec<NodeId>> {
    let mut ids = Vec::with_capacity(count);

    for i in 0..count {
        let identity = NodeIdentity::random();
        tracing::info!("Adding client {} ({})", i, identity.workload);

        let id = registry
            .add_client(identity)
            .await
            .with_context(|| format!("failed to add client {}", i))?;

        send_initial_requests(registry, &id)
            .await
            .with_context(|| format!("failed to subscribe client {}", i))?;

        ids.push(id);
    }

    Ok(ids)
}

/// Subscribes to CDS and LDS. EDS and RDS follow from the responses.
pub async fn send_initial_requests(registry: &ClientRegistry, id: &NodeId) -> Result<()> {
    registry
        .send_request(id, DiscoveryRequest::subscribe(type_url::CLUSTER))
        .await?;

    registry
        .send_request(id, DiscoveryRequest::subscribe(type_url::LISTENER))
        .await?;

    Ok(())
}
