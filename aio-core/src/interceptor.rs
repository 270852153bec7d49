//! The server-side bearer-auth interceptor, shared by `aio-server`
//! (registry/config surfaces) and `aio-agent` (the remote node agent
//! surface) since both require the same bearer validation and
//! principal injection. Lives here, not in either binary crate, so
//! neither depends on the other to get it.

use crate::{Clock, TokenCodec};
use std::sync::Arc;
use tonic::service::Interceptor;
use tonic::{Request, Status};

#[derive(Clone)]
pub struct BearerAuthInterceptor {
    codec: TokenCodec,
    clock: Arc<dyn Clock>,
}

impl BearerAuthInterceptor {
    pub fn new(codec: TokenCodec, clock: Arc<dyn Clock>) -> Self {
        BearerAuthInterceptor { codec, clock }
    }
}

impl Interceptor for BearerAuthInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        let token = bearer_token(&request)?;
        let principal = self.codec.validate(&token, self.clock.now()).map_err(Status::from)?;
        request.extensions_mut().insert(principal);
        Ok(request)
    }
}

fn bearer_token(request: &Request<()>) -> Result<String, Status> {
    let header = request
        .metadata()
        .get("authorization")
        .ok_or_else(|| Status::unauthenticated("missing authorization metadata"))?;
    let value = header
        .to_str()
        .map_err(|_| Status::unauthenticated("authorization metadata is not valid ascii"))?;
    value
        .strip_prefix("Bearer ")
        .map(str::to_string)
        .ok_or_else(|| Status::unauthenticated("authorization metadata must be a bearer token"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SystemClock;

    #[test]
    fn rejects_missing_metadata() {
        let request = Request::new(());
        assert!(bearer_token(&request).is_err());
    }

    #[test]
    fn accepts_well_formed_bearer_header() {
        let mut request = Request::new(());
        request.metadata_mut().insert("authorization", "Bearer abc.def".parse().unwrap());
        assert_eq!(bearer_token(&request).unwrap(), "abc.def");
    }

    #[test]
    fn interceptor_injects_principal_on_valid_token() {
        let codec = TokenCodec::new(b"key".to_vec());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let token = codec.issue("client-1", crate::SubjectType::Client, i64::MAX / 2).unwrap();

        let mut interceptor = BearerAuthInterceptor::new(codec, clock);
        let mut request = Request::new(());
        request
            .metadata_mut()
            .insert("authorization", format!("Bearer {token}").parse().unwrap());

        let validated = interceptor.call(request).unwrap();
        let principal = validated.extensions().get::<crate::Principal>().unwrap();
        assert_eq!(principal.subject_id, "client-1");
    }
}
