//! `TokenProvider`: acquire, cache, and single-flight refresh a bearer
//! token for one client-credential principal.
//!
//! One in-flight refresh at a time; other callers wait and re-check the
//! cache rather than issuing their own `AuthenticateClient` call. A
//! plain async mutex/notify pair, since there's no `tower::Service` seam
//! here — callers invoke `token()` directly before issuing an RPC.

use aio_core::{Error, Result};
use aio_proto::user::client_auth_service_client::ClientAuthServiceClient;
use aio_proto::user::{AuthenticateClientRequest, RenewTokenRequest};
use parking_lot::RwLock;
use secrecy::{ExposeSecret, SecretString};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tonic::transport::Channel;

/// Tokens are renewed proactively once fewer than this many seconds
/// remain, so a token handed to a caller is very unlikely to expire
/// mid-call.
pub const SKEW_SECONDS: i64 = 300;

#[derive(Clone)]
struct CachedToken {
    token: SecretString,
    expires_at: i64,
}

/// Caches and refreshes a bearer token for `client_key`/`client_secret`.
/// The secret and every issued token are held as `SecretString` so a
/// stray `Debug`/log line never leaks them.
pub struct TokenProvider {
    client_key: String,
    client_secret: SecretString,
    auth_client: ClientAuthServiceClient<Channel>,
    cached: RwLock<Option<CachedToken>>,
    refreshing: AtomicBool,
    refreshed: Notify,
    clock: Arc<dyn aio_core::Clock>,
}

impl TokenProvider {
    pub fn new(
        client_key: impl Into<String>,
        client_secret: impl Into<String>,
        channel: Channel,
        clock: Arc<dyn aio_core::Clock>,
    ) -> Self {
        TokenProvider {
            client_key: client_key.into(),
            client_secret: SecretString::from(client_secret.into()),
            auth_client: ClientAuthServiceClient::new(channel),
            cached: RwLock::new(None),
            refreshing: AtomicBool::new(false),
            refreshed: Notify::new(),
            clock,
        }
    }

    fn now(&self) -> i64 {
        self.clock.now()
    }

    /// Drops the cached token. Called after a downstream `Unauthenticated`.
    pub fn invalidate(&self) {
        *self.cached.write() = None;
    }

    fn fresh_enough(cached: &CachedToken, now: i64) -> bool {
        cached.expires_at - now > SKEW_SECONDS
    }

    /// Returns a valid token, refreshing it first if necessary. Only
    /// one refresh is ever in flight; concurrent callers wait on it and
    /// then re-check the cache rather than each issuing their own RPC.
    pub async fn token(&self) -> Result<String> {
        if let Some(cached) = self.cached.read().clone() {
            if Self::fresh_enough(&cached, self.now()) {
                return Ok(cached.token.expose_secret().to_string());
            }
        }

        loop {
            if self
                .refreshing
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                let result = self.refresh().await;
                self.refreshing.store(false, Ordering::Release);
                self.refreshed.notify_waiters();
                return result;
            }

            // Someone else is refreshing; wait for them to finish and
            // re-check the cache before deciding whether to try again.
            self.refreshed.notified().await;
            if let Some(cached) = self.cached.read().clone() {
                if Self::fresh_enough(&cached, self.now()) {
                    return Ok(cached.token.expose_secret().to_string());
                }
            }
        }
    }

    async fn refresh(&self) -> Result<String> {
        let prior = self.cached.read().clone();

        let renewed = if let Some(prior) = &prior {
            if prior.expires_at > self.now() {
                self.try_renew(prior.token.expose_secret()).await
            } else {
                None
            }
        } else {
            None
        };

        let (token, expires_at) = match renewed {
            Some(pair) => pair,
            None => self.authenticate().await?,
        };

        *self.cached.write() = Some(CachedToken {
            token: SecretString::from(token.clone()),
            expires_at,
        });
        Ok(token)
    }

    /// Renewal failure of any kind (expiry, revocation, credential
    /// change) falls back to full re-authentication rather than
    /// propagating.
    async fn try_renew(&self, old_token: &str) -> Option<(String, i64)> {
        let mut request = tonic::Request::new(RenewTokenRequest {
            token: old_token.to_string(),
        });
        request
            .metadata_mut()
            .insert("authorization", format!("Bearer {old_token}").parse().ok()?);

        match self.auth_client.clone().renew_token(request).await {
            Ok(response) => {
                let body = response.into_inner();
                Some((body.token, body.expires_at))
            }
            Err(e) => {
                tracing::debug!(error = %e, "token renewal failed, falling back to re-authentication");
                None
            }
        }
    }

    async fn authenticate(&self) -> Result<(String, i64)> {
        let request = AuthenticateClientRequest {
            client_key: self.client_key.clone(),
            client_secret: self.client_secret.expose_secret().to_string(),
        };
        let response = self
            .auth_client
            .clone()
            .authenticate_client(request)
            .await
            .map_err(Error::from)?;
        let body = response.into_inner();
        Ok((body.token, body.expires_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_enough_respects_skew() {
        let cached = CachedToken {
            token: SecretString::from("t".to_string()),
            expires_at: 1000,
        };
        assert!(TokenProvider::fresh_enough(&cached, 1000 - SKEW_SECONDS - 1));
        assert!(!TokenProvider::fresh_enough(&cached, 1000 - SKEW_SECONDS + 1));
    }
}
