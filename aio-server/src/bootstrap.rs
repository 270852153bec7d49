//! First-start seeding. The HTTP admin surface that actually serves
//! these rows is out of scope, but the row and the YAML loader are
//! ambient concerns a complete server carries regardless.

use serde::Deserialize;

pub const SUPER_ADMIN_ACCOUNT: &str = "admin";
pub const SUPER_ADMIN_PASSWORD: &str = "admin";

/// The super-admin row seeded on first start. Operators are required to
/// change the password; this type only represents what gets written,
/// not the (out-of-scope) admin table itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuperAdmin {
    pub account: String,
    pub password_hash: String,
    pub must_change_password: bool,
}

fn hash_password(password: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Returns the seeded super-admin row iff `admin_rows_exist` is `false`.
/// Idempotent: called again against a non-empty admin table does nothing.
pub fn ensure_super_admin(admin_rows_exist: bool) -> Option<SuperAdmin> {
    if admin_rows_exist {
        return None;
    }
    tracing::warn!(
        account = SUPER_ADMIN_ACCOUNT,
        "seeding default super-admin; change the password immediately"
    );
    Some(SuperAdmin {
        account: SUPER_ADMIN_ACCOUNT.to_string(),
        password_hash: hash_password(SUPER_ADMIN_PASSWORD),
        must_change_password: true,
    })
}

/// One entry in the bootstrap YAML's `servers` list: a remote node the
/// operator wants pre-registered with the agent orchestrator.
#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapServer {
    pub name: String,
    pub host: String,
    #[serde(default = "default_agent_port")]
    pub agent_port: u16,
    pub ssh_user: Option<String>,
    pub ssh_key_path: Option<String>,
}

fn default_agent_port() -> u16 {
    7800
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BootstrapFile {
    #[serde(default)]
    pub servers: Vec<BootstrapServer>,
}

/// Loads the bootstrap YAML at `path`, if present. A missing file is
/// not an error (bootstrap seeding is optional); a malformed one is.
pub fn load_bootstrap_file(path: &str) -> anyhow::Result<BootstrapFile> {
    let contents = std::fs::read_to_string(path)?;
    let parsed: BootstrapFile = serde_yaml::from_str(&contents)?;
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_only_when_admin_table_is_empty() {
        assert!(ensure_super_admin(false).is_some());
        assert!(ensure_super_admin(true).is_none());
    }

    #[test]
    fn parses_bootstrap_yaml() {
        let yaml = r#"
servers:
  - name: web-1
    host: 10.0.0.1
    ssh_user: deploy
    ssh_key_path: /etc/aio/keys/web-1
  - name: web-2
    host: 10.0.0.2
"#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bootstrap.yaml");
        std::fs::write(&path, yaml).unwrap();

        let parsed = load_bootstrap_file(path.to_str().unwrap()).unwrap();
        assert_eq!(parsed.servers.len(), 2);
        assert_eq!(parsed.servers[0].name, "web-1");
        assert_eq!(parsed.servers[0].agent_port, 7800);
        assert_eq!(parsed.servers[1].ssh_user, None);
    }

    #[test]
    fn missing_file_is_an_error_not_a_panic() {
        assert!(load_bootstrap_file("/nonexistent/path/bootstrap.yaml").is_err());
    }
}
