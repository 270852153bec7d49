//! `ServerConfig`: environment-variable configuration for the control
//! plane binary. Every field has a documented default so a bare
//! `aio-server` with no environment still starts.

use std::time::Duration;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `host:port` the gRPC server binds to.
    pub listen_addr: std::net::SocketAddr,
    /// Shared HMAC signing key for bearer tokens. Every peer that must
    /// validate tokens offline needs this value.
    pub signing_key: Vec<u8>,
    /// How long an issued token remains valid before the client's
    /// `TokenProvider` must renew it.
    pub token_ttl: Duration,
    /// TTL sweeper period override; `None` uses
    /// `aio_runtime::registry::sweeper::recommended_period`.
    pub sweep_period: Option<Duration>,
    /// Optional path to a YAML file seeding bootstrap servers/SSH
    /// credentials.
    pub bootstrap_yaml_path: Option<String>,
    pub log_level: String,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let listen_addr = env_or("AIO_LISTEN_ADDR", "0.0.0.0:7700")
            .parse()
            .expect("AIO_LISTEN_ADDR must be a valid socket address");
        let signing_key = std::env::var("AIO_SIGNING_KEY")
            .unwrap_or_else(|_| "aio-dev-signing-key-change-me".to_string())
            .into_bytes();
        let token_ttl = Duration::from_secs(env_parse("AIO_TOKEN_TTL_SECONDS", 3600));
        let sweep_period = std::env::var("AIO_SWEEP_PERIOD_SECONDS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs);
        let bootstrap_yaml_path = std::env::var("AIO_BOOTSTRAP_YAML").ok();
        let log_level = env_or("AIO_LOG_LEVEL", "info");

        ServerConfig {
            listen_addr,
            signing_key,
            token_ttl,
            sweep_period,
            bootstrap_yaml_path,
            log_level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_or_falls_back_to_default() {
        assert_eq!(env_or("AIO_TEST_UNSET_VAR_XYZ", "fallback"), "fallback");
    }
}
