//! The `aio` control plane binary's library half: wires
//! `aio_runtime`'s engines to `tonic` service implementations, the
//! bearer-auth interceptor, and bootstrap seeding. Split from `main.rs`
//! so `e2e` can start an in-process server against a real socket
//! without going through the CLI entry point.

pub mod bootstrap;
pub mod config;
pub mod service;

use aio_core::{BearerAuthInterceptor, Clock, SystemClock, TokenCodec};
use aio_proto::config::config_service_server::ConfigServiceServer;
use aio_proto::registry::registry_service_server::RegistryServiceServer;
use aio_proto::user::client_auth_service_server::ClientAuthServiceServer;
use aio_runtime::registry::sweeper;
use aio_runtime::{ConfigEngine, CredentialStore, RegistryStore};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;

/// The engines behind every RPC surface this process exposes.
pub struct AppState {
    pub registry: Arc<RegistryStore>,
    pub config_engine: Arc<ConfigEngine>,
    pub credentials: Arc<CredentialStore>,
    pub codec: TokenCodec,
    pub clock: Arc<dyn Clock>,
    pub token_ttl: Duration,
}

impl AppState {
    pub fn new(signing_key: Vec<u8>, token_ttl: Duration) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        AppState {
            registry: Arc::new(RegistryStore::new(Arc::clone(&clock))),
            config_engine: Arc::new(ConfigEngine::new(Arc::clone(&clock))),
            credentials: Arc::new(CredentialStore::new()),
            codec: TokenCodec::new(signing_key),
            clock,
            token_ttl,
        }
    }
}

/// Seeds a development client credential so a fresh server is usable
/// without wiring the (out-of-scope) admin HTTP surface first. Real
/// deployments manage credentials through that surface; tests and this
/// helper bypass it deliberately.
pub fn seed_dev_credential(state: &AppState, client_key: &str, client_secret: &str) {
    state.credentials.put(client_key, client_secret, None, None);
}

/// Builds the composed gRPC router: `RegistryService` and
/// `ConfigService` behind the shared bearer interceptor,
/// `ClientAuthService` unwrapped (it validates its own bearer metadata
/// for `RenewToken`; `AuthenticateClient` is the skip-listed entry
/// point).
pub fn router(state: Arc<AppState>) -> tonic::transport::server::Router {
    let auth_interceptor = BearerAuthInterceptor::new(state.codec.clone(), Arc::clone(&state.clock));

    let registry_svc = RegistryServiceServer::with_interceptor(
        service::RegistryServiceImpl::new(Arc::clone(&state.registry)),
        auth_interceptor.clone(),
    );
    let config_svc = ConfigServiceServer::with_interceptor(
        service::ConfigServiceImpl::new(Arc::clone(&state.config_engine)),
        auth_interceptor,
    );
    let user_svc = ClientAuthServiceServer::new(service::ClientAuthServiceImpl::new(
        Arc::clone(&state.credentials),
        state.codec.clone(),
        Arc::clone(&state.clock),
        state.token_ttl,
    ));

    Server::builder()
        .add_service(registry_svc)
        .add_service(config_svc)
        .add_service(user_svc)
}

/// Runs the server on `listen_addr` until `shutdown` fires, with the
/// TTL sweeper running alongside it.
pub async fn serve(
    state: Arc<AppState>,
    listen_addr: std::net::SocketAddr,
    sweep_period: Duration,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let sweeper_handle = tokio::spawn(sweeper::run(Arc::clone(&state.registry), sweep_period, shutdown.clone()));

    let server_shutdown = shutdown.clone();
    router(state)
        .serve_with_shutdown(listen_addr, async move { server_shutdown.cancelled().await })
        .await?;

    shutdown.cancel();
    let _ = sweeper_handle.await;
    Ok(())
}
