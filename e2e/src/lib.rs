//! Shared harness for end-to-end scenario tests: spins up a real
//! `aio-server` bound to an ephemeral loopback port and hands back a
//! connected channel, driving the real server instead of mocking the
//! service implementations.

use aio_server::{seed_dev_credential, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Channel;

pub const DEV_CLIENT_KEY: &str = "e2e-client";
pub const DEV_CLIENT_SECRET: &str = "e2e-secret";

/// A running server plus the handles needed to stop it cleanly.
pub struct ServerHandle {
    pub addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub async fn stop(self) {
        self.shutdown.cancel();
        let _ = self.task.await;
    }

    pub async fn connect(&self) -> Channel {
        aio_client::dial(&self.addr.to_string()).await.expect("connect to e2e server")
    }
}

/// Starts a server with a one-hour token TTL, suitable for every
/// scenario that isn't specifically exercising renewal.
pub async fn spawn_server() -> ServerHandle {
    spawn_server_with_token_ttl(Duration::from_secs(3600)).await
}

pub async fn spawn_server_with_token_ttl(token_ttl: Duration) -> ServerHandle {
    let state = Arc::new(AppState::new(b"e2e-signing-key".to_vec(), token_ttl));
    seed_dev_credential(&state, DEV_CLIENT_KEY, DEV_CLIENT_SECRET);

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
    let addr = listener.local_addr().expect("read local addr");
    let incoming = TcpListenerStream::new(listener);

    let shutdown = CancellationToken::new();
    let sweeper_shutdown = shutdown.clone();
    let sweeper = tokio::spawn(aio_runtime::registry::sweeper::run(
        Arc::clone(&state.registry),
        Duration::from_millis(500),
        sweeper_shutdown,
    ));

    let server_shutdown = shutdown.clone();
    let router = aio_server::router(state);
    let task = tokio::spawn(async move {
        router
            .serve_with_incoming_shutdown(incoming, async move { server_shutdown.cancelled().await })
            .await
            .expect("e2e server exited with an error");
        sweeper.await.ok();
    });

    ServerHandle { addr, shutdown, task }
}

/// Authenticates the seeded dev credential and returns a bearer token.
pub async fn authenticate(channel: Channel) -> String {
    use aio_proto::user::client_auth_service_client::ClientAuthServiceClient;
    use aio_proto::user::AuthenticateClientRequest;

    let response = ClientAuthServiceClient::new(channel)
        .authenticate_client(AuthenticateClientRequest {
            client_key: DEV_CLIENT_KEY.to_string(),
            client_secret: DEV_CLIENT_SECRET.to_string(),
        })
        .await
        .expect("authenticate_client")
        .into_inner();
    response.token
}

/// Wraps a request body with the bearer metadata `RegistryService` and
/// `ConfigService` require (they sit behind the shared interceptor).
pub fn authed<T>(token: &str, message: T) -> tonic::Request<T> {
    let mut request = tonic::Request::new(message);
    request
        .metadata_mut()
        .insert("authorization", format!("Bearer {token}").parse().expect("ascii bearer header"));
    request
}
