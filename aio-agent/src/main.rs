//! `aio-agent`: the remote node agent binary. Loads configuration from
//! the environment and serves the nginx/systemd/SSL surface until a
//! shutdown signal.

use aio_agent::{config::AgentConfig, serve, AppState};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AgentConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .init();

    let state = AppState::new(config.signing_key.clone());

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
        shutdown_signal.cancel();
    });

    info!(addr = %config.listen_addr, "aio-agent listening");
    serve(state, config.listen_addr, shutdown).await
}
