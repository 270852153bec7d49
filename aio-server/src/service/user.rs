//! `ClientAuthService` RPC surface: issues and renews bearer tokens for
//! client-credential principals. `AuthenticateClient` is the skip-listed
//! entry point (no prior token required); `RenewToken` validates the
//! token it is handed itself, since this service is never wrapped by
//! the shared `BearerAuthInterceptor` (see `main.rs`).

use aio_core::{Clock, SubjectType, TokenCodec};
use aio_proto::user::client_auth_service_server::ClientAuthService;
use aio_proto::user::{AuthenticateClientRequest, RenewTokenRequest, TokenResponse};
use aio_runtime::CredentialStore;
use std::sync::Arc;
use std::time::Duration;
use tonic::{Request, Response, Status};

pub struct ClientAuthServiceImpl {
    credentials: Arc<CredentialStore>,
    codec: TokenCodec,
    clock: Arc<dyn Clock>,
    token_ttl: Duration,
}

impl ClientAuthServiceImpl {
    pub fn new(credentials: Arc<CredentialStore>, codec: TokenCodec, clock: Arc<dyn Clock>, token_ttl: Duration) -> Self {
        ClientAuthServiceImpl {
            credentials,
            codec,
            clock,
            token_ttl,
        }
    }

    fn bearer_token(request: &Request<RenewTokenRequest>) -> Option<String> {
        request
            .metadata()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::to_string)
    }
}

#[tonic::async_trait]
impl ClientAuthService for ClientAuthServiceImpl {
    async fn authenticate_client(
        &self,
        request: Request<AuthenticateClientRequest>,
    ) -> Result<Response<TokenResponse>, Status> {
        let req = request.into_inner();
        let now = self.clock.now();
        self.credentials
            .verify(&req.client_key, &req.client_secret, now)
            .map_err(Status::from)?;

        let expires_at = now + self.token_ttl.as_secs() as i64;
        let token = self
            .codec
            .issue(&req.client_key, SubjectType::Client, expires_at)
            .map_err(Status::from)?;
        Ok(Response::new(TokenResponse { token, expires_at }))
    }

    async fn renew_token(&self, request: Request<RenewTokenRequest>) -> Result<Response<TokenResponse>, Status> {
        let now = self.clock.now();
        // The old token may be carried in the metadata (the normal SDK
        // path) or in the request body (so unary tests can exercise
        // renewal without metadata plumbing, per `user.proto`'s
        // `RenewTokenRequest.token` doc comment).
        let carried = Self::bearer_token(&request);
        let body_token = request.get_ref().token.clone();
        let old_token = carried.filter(|t| !t.is_empty()).unwrap_or(body_token);
        if old_token.is_empty() {
            return Err(Status::unauthenticated("no token presented for renewal"));
        }

        let principal = self.codec.validate(&old_token, now).map_err(Status::from)?;

        let expires_at = now + self.token_ttl.as_secs() as i64;
        let token = self
            .codec
            .issue(&principal.subject_id, principal.subject_type, expires_at)
            .map_err(Status::from)?;
        Ok(Response::new(TokenResponse { token, expires_at }))
    }
}
