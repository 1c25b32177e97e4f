//! Client Driver Module
//!
//! The lifecycle manager for simulated clients. It owns one protocol session per
//! node, notices when a session ends, and re-establishes it for as long as the
//! driver runs.
//!
//! ## Client lifecycle
//! 1. **Connecting**: `ClientRegistry::add_client` dials a session. A failed dial
//!    is returned to the caller and leaves nothing behind.
//! 2. **Active**: The session is registered under the node's id and a watcher
//!    task waits for its termination signal.
//! 3. **Reconnecting**: On termination the entry is removed at once, then the
//!    watcher keeps dialing at a fixed interval until a session is registered again.
//! 4. **Closed**: `ClientRegistry::close` closes every session and stops all
//!    watchers and reconnect loops.
//!
//! ## Submodules
//! - **`registry`**: The concurrency-safe client map and the reconnect state machine.
//! - **`types`**: The per-node config snapshot served to readers.
//! - **`error`**: Registry error conditions.
//! - **`bootstrap`**: Startup sequence creating the initial clients.
//! - **`handlers`**: HTTP endpoints exposing the snapshot.

pub mod bootstrap;
pub mod error;
pub mod handlers;
pub mod registry;
pub mod types;

#[cfg(test)]
mod tests;
