//! A self-contained bearer token, signed with a shared HMAC key so that
//! any peer holding the key can validate it offline without calling
//! back into the auth service.
//!
//! Format: `base64url(json claims).base64url(hmac-sha256 over the first
//! segment)`. Plain and inspectable by design — there is no encryption,
//! only integrity and expiry.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// The subject type bound to a token. Only `client` principals are
/// modeled by this spec (client-credential auth); the tag is carried so
/// a future admin/session principal can share the same wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectType {
    Client,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Claims {
    sub: String,
    sub_type: SubjectType,
    exp: i64,
    /// Random per-issuance value; present purely so two tokens issued
    /// in the same second for the same subject don't collide byte-for-byte.
    jti: String,
}

/// The principal identified by a validated token, injected into the
/// request context by the server-side auth interceptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub subject_id: String,
    pub subject_type: SubjectType,
}

/// Signs and validates bearer tokens under one shared key. Stateless:
/// holding the same key bytes on two processes is sufficient for either
/// to validate tokens the other issued.
#[derive(Clone)]
pub struct TokenCodec {
    key: Vec<u8>,
}

impl TokenCodec {
    pub fn new(signing_key: impl Into<Vec<u8>>) -> Self {
        TokenCodec { key: signing_key.into() }
    }

    /// Issues a token for `subject_id` valid until `expires_at` (epoch
    /// seconds).
    pub fn issue(&self, subject_id: &str, subject_type: SubjectType, expires_at: i64) -> Result<String> {
        let claims = Claims {
            sub: subject_id.to_string(),
            sub_type: subject_type,
            exp: expires_at,
            jti: uuid::Uuid::new_v4().to_string(),
        };
        let payload = serde_json::to_vec(&claims).map_err(|e| Error::internal(format!("encoding token claims: {e}")))?;
        let payload_b64 = URL_SAFE_NO_PAD.encode(payload);
        let signature = self.sign(payload_b64.as_bytes());
        Ok(format!("{payload_b64}.{signature}"))
    }

    fn sign(&self, data: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("HMAC accepts keys of any length");
        mac.update(data);
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }

    /// Validates signature and expiry, returning the bound principal.
    /// Any structural or signature failure is `Unauthenticated`, never
    /// a different error kind, so callers can treat "bad token" and
    /// "expired token" uniformly.
    pub fn validate(&self, token: &str, now: i64) -> Result<Principal> {
        let (payload_b64, signature) = token
            .split_once('.')
            .ok_or_else(|| Error::unauthenticated("malformed token"))?;

        let expected = self.sign(payload_b64.as_bytes());
        if !constant_time_eq(expected.as_bytes(), signature.as_bytes()) {
            return Err(Error::unauthenticated("token signature mismatch"));
        }

        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| Error::unauthenticated("malformed token payload"))?;
        let claims: Claims = serde_json::from_slice(&payload).map_err(|_| Error::unauthenticated("malformed token claims"))?;

        if now >= claims.exp {
            return Err(Error::unauthenticated("token expired"));
        }

        Ok(Principal {
            subject_id: claims.sub,
            subject_type: claims.sub_type,
        })
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_validates_before_expiry() {
        let codec = TokenCodec::new(b"test-key".to_vec());
        let token = codec.issue("client-1", SubjectType::Client, 1_000).unwrap();
        let principal = codec.validate(&token, 500).unwrap();
        assert_eq!(principal.subject_id, "client-1");
        assert_eq!(principal.subject_type, SubjectType::Client);
    }

    #[test]
    fn expired_token_is_unauthenticated() {
        let codec = TokenCodec::new(b"test-key".to_vec());
        let token = codec.issue("client-1", SubjectType::Client, 1_000).unwrap();
        let err = codec.validate(&token, 1_000).unwrap_err();
        assert!(err.is_unauthenticated());
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let codec = TokenCodec::new(b"test-key".to_vec());
        let token = codec.issue("client-1", SubjectType::Client, 1_000).unwrap();
        let (payload, sig) = token.split_once('.').unwrap();
        let tampered = format!("{}x.{sig}", payload);
        let err = codec.validate(&tampered, 0).unwrap_err();
        assert!(err.is_unauthenticated());
    }

    #[test]
    fn wrong_key_is_rejected() {
        let issuer = TokenCodec::new(b"key-a".to_vec());
        let verifier = TokenCodec::new(b"key-b".to_vec());
        let token = issuer.issue("client-1", SubjectType::Client, 1_000).unwrap();
        let err = verifier.validate(&token, 0).unwrap_err();
        assert!(err.is_unauthenticated());
    }
}
