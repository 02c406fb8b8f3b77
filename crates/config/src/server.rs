use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use serde::Deserialize;

/// The default port matches the Ollama daemon so existing Ollama
/// clients connect without reconfiguration.
const DEFAULT_PORT: u16 = 11434;

/// Configuration for the HTTP listener.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// The address and port the relay listens on.
    pub listen_address: Option<SocketAddr>,
}

impl ServerConfig {
    /// The configured listen address, or the loopback Ollama default.
    pub fn listen_address(&self) -> SocketAddr {
        self.listen_address
            .unwrap_or_else(|| SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_PORT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_listen_address() {
        let config = ServerConfig::default();
        assert_eq!(config.listen_address().to_string(), "127.0.0.1:11434");
    }

    #[test]
    fn custom_listen_address() {
        let config: ServerConfig = toml::from_str(r#"listen_address = "0.0.0.0:8080""#).unwrap();
        assert_eq!(config.listen_address().to_string(), "0.0.0.0:8080");
    }
}
