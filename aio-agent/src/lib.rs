//! The `aio-agent` binary's library half: wires `aio_runtime::AgentEngine`
//! to the `AgentService` gRPC surface behind the shared bearer-auth
//! interceptor. Split from `main.rs` so `e2e` can start an in-process
//! agent against a real socket without going through the CLI entry point.

pub mod config;
pub mod service;

use aio_core::{BearerAuthInterceptor, Clock, SystemClock, TokenCodec};
use aio_proto::agent::agent_service_server::AgentServiceServer;
use aio_runtime::AgentEngine;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;

pub struct AppState {
    pub engine: AgentEngine,
    pub codec: TokenCodec,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(signing_key: Vec<u8>) -> Self {
        AppState {
            engine: AgentEngine::default(),
            codec: TokenCodec::new(signing_key),
            clock: Arc::new(SystemClock),
        }
    }
}

/// Builds the composed gRPC router: `AgentService` behind the same
/// bearer interceptor `aio-server` applies to its own surfaces.
pub fn router(state: AppState) -> tonic::transport::server::Router {
    let auth_interceptor = BearerAuthInterceptor::new(state.codec, state.clock);
    let agent_svc = AgentServiceServer::with_interceptor(service::AgentServiceImpl::new(state.engine), auth_interceptor);

    Server::builder().add_service(agent_svc)
}

pub async fn serve(state: AppState, listen_addr: std::net::SocketAddr, shutdown: CancellationToken) -> anyhow::Result<()> {
    router(state)
        .serve_with_shutdown(listen_addr, async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
