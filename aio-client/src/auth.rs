//! Attaches a `TokenProvider`'s bearer token to every outgoing call on
//! the services guarded by the server-side `BearerAuthInterceptor`
//! (`RegistryService`, `ConfigService`).
//!
//! `tonic::service::Interceptor` is synchronous, so it cannot itself
//! await a token refresh. Instead a background task keeps a shared
//! cell filled with the latest token, refreshed ahead of the request
//! path, and the interceptor only ever does a synchronous read of it.

use aio_core::Result;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tonic::service::Interceptor;
use tonic::service::interceptor::InterceptedService;
use tonic::transport::Channel;
use tonic::{Request, Status};

use crate::token::TokenProvider;

/// How often the background refresher re-checks the token, independent
/// of `TokenProvider::SKEW_SECONDS` (a cheap poll; the provider itself
/// decides whether a real refresh RPC is due).
const POLL_INTERVAL_SECS: u64 = 30;

pub type AuthedChannel = InterceptedService<Channel, BearerTokenInterceptor>;

#[derive(Clone)]
pub struct BearerTokenInterceptor {
    cell: Arc<RwLock<Option<String>>>,
}

impl Interceptor for BearerTokenInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        let token = self
            .cell
            .read()
            .clone()
            .ok_or_else(|| Status::unauthenticated("no token available yet"))?;
        let value = format!("Bearer {token}")
            .parse()
            .map_err(|_| Status::internal("token is not valid ascii"))?;
        request.metadata_mut().insert("authorization", value);
        Ok(request)
    }
}

/// Fetches an initial token synchronously, spawns a background task
/// that keeps the cell fresh, and wraps `channel` with the resulting
/// interceptor. Returns the wrapped channel and a handle the caller
/// can cancel to stop the refresher (e.g. on shutdown).
pub async fn authed_channel(channel: Channel, tokens: Arc<TokenProvider>) -> Result<(AuthedChannel, CancellationToken)> {
    let cell = Arc::new(RwLock::new(None));
    *cell.write() = Some(tokens.token().await?);

    let cancel = CancellationToken::new();
    tokio::spawn(refresh_loop(tokens, Arc::clone(&cell), cancel.clone()));

    let interceptor = BearerTokenInterceptor { cell };
    Ok((InterceptedService::new(channel, interceptor), cancel))
}

async fn refresh_loop(tokens: Arc<TokenProvider>, cell: Arc<RwLock<Option<String>>>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(std::time::Duration::from_secs(POLL_INTERVAL_SECS)) => {
                match tokens.token().await {
                    Ok(token) => *cell.write() = Some(token),
                    Err(e) => tracing::warn!(error = %e, "background token refresh failed"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_when_cell_is_empty() {
        let mut interceptor = BearerTokenInterceptor { cell: Arc::new(RwLock::new(None)) };
        assert!(interceptor.call(Request::new(())).is_err());
    }

    #[test]
    fn attaches_bearer_header_once_populated() {
        let cell = Arc::new(RwLock::new(Some("tok123".to_string())));
        let mut interceptor = BearerTokenInterceptor { cell };
        let request = interceptor.call(Request::new(())).unwrap();
        let header = request.metadata().get("authorization").unwrap().to_str().unwrap();
        assert_eq!(header, "Bearer tok123");
    }
}
