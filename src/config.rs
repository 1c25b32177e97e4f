//! Runtime configuration for the driver.

use std::net::SocketAddr;
use std::time::Duration;

pub const DEFAULT_HTTP_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_CLIENTS: usize = 1;

/// Pause between two reconnect attempts for the same node.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, PartialEq)]
pub struct DriverConfig {
    /// Where the config dump endpoint is served.
    pub http_addr: SocketAddr,
    /// Control plane the simulated clients connect to.
    pub control_plane_address: String,
    /// Number of clients created at startup.
    pub clients: usize,
    pub retry_interval: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            control_plane_address: String::new(),
            clients: DEFAULT_CLIENTS,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}
