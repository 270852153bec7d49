//! The remote node agent engine: nginx conf.d, systemd
//! units, and SSL material, all validate-then-activate and atomic.

pub mod command;
pub mod nginx;
pub mod paths;
pub mod ssl;
pub mod systemd;

pub use nginx::NginxEngine;
pub use systemd::{SystemdEngine, SystemdStatus};

use aio_core::{Error, Result};
use std::path::PathBuf;

/// Bundles the per-capability engines behind one handle, as the
/// `AgentService` RPC implementation sees it.
pub struct AgentEngine {
    pub nginx: NginxEngine,
    pub systemd: SystemdEngine,
}

impl Default for AgentEngine {
    fn default() -> Self {
        AgentEngine {
            nginx: NginxEngine::default(),
            systemd: SystemdEngine::default(),
        }
    }
}

impl AgentEngine {
    pub async fn deploy_ssl_certificate(
        &self,
        base_path: &str,
        fullchain_name: &str,
        privkey_name: &str,
        fullchain_pem: &str,
        privkey_pem: &str,
        file_mode: u32,
    ) -> Result<(PathBuf, PathBuf)> {
        ssl::deploy_certificate(base_path, fullchain_name, privkey_name, fullchain_pem, privkey_pem, file_mode).await
    }

    /// Dispatches to nginx reload or systemd `<action>` based on
    /// `service_type ∈ {nginx, systemd}`.
    pub async fn reload_service(&self, service_type: &str, service_name: &str) -> Result<String> {
        match service_type {
            "nginx" => self.nginx.reload().await,
            "systemd" => self.systemd.control(service_name, "reload").await,
            other => Err(Error::invalid_argument(format!("unknown service_type '{other}'"))),
        }
    }
}
