//! Client-credential storage backing `ClientAuthService.AuthenticateClient`.
//! The HTTP admin surface that manages these rows is out of scope here;
//! this engine only covers the verification path the server needs to
//! issue tokens, plus the bootstrap seeding call used at startup.

use aio_core::{ClientCredential, CredentialStatus, Error, Result};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// In-memory client-credential store. A real deployment backs this with
/// the same relational store as admins/services/instances/configs; the
/// engine only needs `{lookup, insert}`.
#[derive(Default)]
pub struct CredentialStore {
    credentials: RwLock<HashMap<String, ClientCredential>>,
}

fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

impl CredentialStore {
    pub fn new() -> Self {
        CredentialStore::default()
    }

    /// Creates or rotates a credential, returning the plaintext secret
    /// exactly once, on creation/rotation. The caller is responsible
    /// for propagating it; only the hash is retained here.
    pub fn put(&self, client_key: &str, client_secret: &str, expires_at: Option<i64>, ip_whitelist: Option<Vec<String>>) {
        let credential = ClientCredential {
            client_key: client_key.to_string(),
            client_secret_hash: hash_secret(client_secret),
            status: CredentialStatus::Active,
            expires_at,
            ip_whitelist,
        };
        self.credentials.write().insert(client_key.to_string(), credential);
    }

    /// Verifies `client_key`/`client_secret` against the stored hash,
    /// status, and expiry. Every failure mode collapses to
    /// `Unauthenticated` — the caller never learns *why* a credential
    /// was rejected, only that it was.
    pub fn verify(&self, client_key: &str, client_secret: &str, now: i64) -> Result<()> {
        let credentials = self.credentials.read();
        let credential = credentials
            .get(client_key)
            .ok_or_else(|| Error::unauthenticated("unknown client_key"))?;

        if credential.status != CredentialStatus::Active {
            return Err(Error::unauthenticated("client credential is disabled"));
        }
        if let Some(expires_at) = credential.expires_at {
            if now >= expires_at {
                return Err(Error::unauthenticated("client credential expired"));
            }
        }
        if credential.client_secret_hash != hash_secret(client_secret) {
            return Err(Error::unauthenticated("client secret mismatch"));
        }
        Ok(())
    }

    pub fn disable(&self, client_key: &str) -> Result<()> {
        let mut credentials = self.credentials.write();
        let credential = credentials
            .get_mut(client_key)
            .ok_or_else(|| Error::not_found(format!("client credential '{client_key}'")))?;
        credential.status = CredentialStatus::Disabled;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifies_matching_secret() {
        let store = CredentialStore::new();
        store.put("k1", "s1", None, None);
        store.verify("k1", "s1", 0).unwrap();
    }

    #[test]
    fn rejects_wrong_secret() {
        let store = CredentialStore::new();
        store.put("k1", "s1", None, None);
        assert!(store.verify("k1", "wrong", 0).unwrap_err().is_unauthenticated());
    }

    #[test]
    fn rejects_expired_credential() {
        let store = CredentialStore::new();
        store.put("k1", "s1", Some(100), None);
        assert!(store.verify("k1", "s1", 100).unwrap_err().is_unauthenticated());
    }

    #[test]
    fn disabled_credential_is_rejected() {
        let store = CredentialStore::new();
        store.put("k1", "s1", None, None);
        store.disable("k1").unwrap();
        assert!(store.verify("k1", "s1", 0).unwrap_err().is_unauthenticated());
    }
}
