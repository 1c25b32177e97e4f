use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use xds_driver::config::{
    DriverConfig, DEFAULT_CLIENTS, DEFAULT_HTTP_ADDR, DEFAULT_RETRY_INTERVAL,
};
use xds_driver::driver::bootstrap::start_clients;
use xds_driver::driver::handlers::router;
use xds_driver::driver::registry::ClientRegistry;
use xds_driver::xds::tcp::TcpDialer;

/// Drive simulated xDS clients against a control plane
#[derive(Parser, Debug)]
#[command(name = "xds-driver", version, about, long_about = None)]
struct Cli {
    /// Address the config dump endpoint listens on
    #[arg(long = "http-addr", default_value = DEFAULT_HTTP_ADDR)]
    http_addr: SocketAddr,

    /// Control plane address
    #[arg(long = "pilot-address")]
    pilot_address: String,

    /// Number of concurrent clients
    #[arg(long, default_value_t = DEFAULT_CLIENTS)]
    clients: usize,

    /// Delay between reconnect attempts, in milliseconds
    #[arg(long = "retry-interval-ms", default_value_t = DEFAULT_RETRY_INTERVAL.as_millis() as u64)]
    retry_interval_ms: u64,
}

impl From<Cli> for DriverConfig {
    fn from(cli: Cli) -> Self {
        Self {
            http_addr: cli.http_addr,
            control_plane_address: cli.pilot_address,
            clients: cli.clients,
            retry_interval: Duration::from_millis(cli.retry_interval_ms),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = DriverConfig::from(Cli::parse());

    tracing::info!(
        "Starting {} client(s) against {}",
        config.clients,
        config.control_plane_address
    );

    let registry = ClientRegistry::from_config(&config, Arc::new(TcpDialer));
    let result = run(&config, registry.clone()).await;

    registry.close().await;

    if let Err(e) = &result {
        tracing::error!("Driver stopped: {:#}", e);
    }
    result
}

async fn run(config: &DriverConfig, registry: Arc<ClientRegistry>) -> anyhow::Result<()> {
    start_clients(&registry, config.clients).await?;

    let app = router(registry);

    let listener = tokio::net::TcpListener::bind(config.http_addr).await?;
    tracing::info!("HTTP server listening on {}", config.http_addr);
    tracing::info!("Press Ctrl+C to shutdown");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
