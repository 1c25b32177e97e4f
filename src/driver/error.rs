use crate::identity::types::NodeId;
use crate::xds::session::SessionError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("node {0} not found")]
    NotFound(NodeId),

    #[error("node {0} is already registered")]
    AlreadyRegistered(NodeId),

    #[error("client registry is closed")]
    Closed,

    #[error("failed to connect node {id} to the control plane: {source}")]
    Dial {
        id: NodeId,
        #[source]
        source: SessionError,
    },

    #[error(transparent)]
    Session(#[from] SessionError),
}
