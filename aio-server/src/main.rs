//! `aio-server`: the control-plane binary. Loads configuration from the
//! environment, seeds bootstrap state, and serves the registry,
//! config, and client-auth gRPC surfaces until a shutdown signal.

use aio_runtime::registry::{sweeper, MIN_TTL_SECONDS};
use aio_server::{bootstrap, config::ServerConfig, serve, AppState};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .init();

    // No admin table in this core (the HTTP admin surface that owns it
    // is out of scope); treat every start as "no admin rows" so the
    // bootstrap path is always exercised.
    if let Some(admin) = bootstrap::ensure_super_admin(false) {
        info!(account = %admin.account, "bootstrap super-admin seeded");
    }

    if let Some(path) = &config.bootstrap_yaml_path {
        match bootstrap::load_bootstrap_file(path) {
            Ok(file) => info!(servers = file.servers.len(), path, "loaded bootstrap servers"),
            Err(e) => tracing::warn!(path, error = %e, "failed to load bootstrap yaml"),
        }
    }

    let state = Arc::new(AppState::new(config.signing_key.clone(), config.token_ttl));
    let sweep_period = config.sweep_period.unwrap_or_else(|| sweeper::recommended_period(MIN_TTL_SECONDS));

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
        shutdown_signal.cancel();
    });

    info!(addr = %config.listen_addr, "aio-server listening");
    serve(state, config.listen_addr, sweep_period, shutdown).await
}
