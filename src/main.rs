use tracing_subscriber::EnvFilter;

use warden::config::Config;
use warden::server::Server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load()?;
    let handle = Server::start(cfg).await?;
    tracing::info!(addr = %handle.local_addr(), "Warden started");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    let status = handle.status();
    tracing::info!(
        accepted = status.accepted,
        shed = status.shed,
        active = status.active_connections,
        "Stopping"
    );
    handle.stop().await;

    Ok(())
}
