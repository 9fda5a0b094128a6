//! Tic-Tac-Toe Match Relay
//!
//! Runs the WebSocket relay over an in-memory record store.

use std::sync::Arc;
use anyhow::Context;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use tictactoe::{
    VERSION,
    config::RelayConfig,
    network::GameServer,
    online::store::InMemoryStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    let config = RelayConfig::from_env().context("invalid relay configuration")?;

    info!("Tic-Tac-Toe relay v{}", VERSION);
    info!("Max connections: {}", config.max_connections);
    info!(
        "Idle timeout: {}s, waiting matches expire after {}s",
        config.idle_timeout.as_secs(),
        config.stale_waiting_after.as_secs()
    );

    let server = Arc::new(GameServer::new(config, Arc::new(InMemoryStore::new())));

    let signal_server = server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
            signal_server.shutdown();
        }
    });

    server.run().await.context("relay stopped with an error")?;
    info!("Relay stopped");
    Ok(())
}
