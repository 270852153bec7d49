//! Environment-sourced configuration for the agent binary, mirroring
//! `aio_server::config`.

pub struct AgentConfig {
    pub listen_addr: std::net::SocketAddr,
    pub signing_key: Vec<u8>,
    pub log_level: String,
}

impl AgentConfig {
    pub fn from_env() -> Self {
        let listen_addr = env_or("AIO_AGENT_LISTEN_ADDR", "0.0.0.0:7800")
            .parse()
            .expect("AIO_AGENT_LISTEN_ADDR must be a valid socket address");
        let signing_key = env_or("AIO_SIGNING_KEY", "aio-dev-signing-key-change-me").into_bytes();
        let log_level = env_or("AIO_LOG_LEVEL", "info");

        AgentConfig { listen_addr, signing_key, log_level }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_or_falls_back_to_default() {
        assert_eq!(env_or("AIO_AGENT_DOES_NOT_EXIST", "fallback"), "fallback");
    }
}
