//! Copilot Relay configuration structures to map the copilot-relay.toml configuration.

#![deny(missing_docs)]

mod auth;
mod loader;
mod log_settings;
mod model;
mod server;
mod upstream;

use std::path::Path;

pub use auth::AuthConfig;
pub use log_settings::LogConfig;
pub use model::ModelConfig;
use serde::Deserialize;
pub use server::ServerConfig;
pub use upstream::UpstreamConfig;

/// Main configuration structure for the Copilot Relay application.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server configuration settings.
    pub server: ServerConfig,
    /// Credential store configuration settings.
    pub auth: AuthConfig,
    /// Upstream identification settings sent with every Copilot request.
    pub upstream: UpstreamConfig,
    /// Default model selection.
    pub model: ModelConfig,
    /// Logging configuration settings.
    pub log: LogConfig,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
        loader::load(path)
    }

    /// Validates upstream identification and credential settings.
    pub fn validate(&self) -> anyhow::Result<()> {
        loader::validate(self)
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_debug_snapshot;

    use crate::Config;

    #[test]
    fn defaults() {
        let config: Config = toml::from_str("").unwrap();

        assert_debug_snapshot!(&config, @r#"
        Config {
            server: ServerConfig {
                listen_address: None,
            },
            auth: AuthConfig {
                token_path: None,
            },
            upstream: UpstreamConfig {
                endpoint: None,
                integration_id: "vscode-chat",
                editor_version: "vscode/1.95.0",
                editor_plugin_version: "copilot-chat/0.22.4",
            },
            model: ModelConfig {
                default_id: "gpt-4o-2024-11-20",
                default_name: "GPT-4o",
            },
            log: LogConfig {
                filter: "info",
            },
        }
        "#);
    }

    #[test]
    fn full_roundtrip() {
        let config: Config = toml::from_str(
            r#"
            [server]
            listen_address = "0.0.0.0:11435"

            [auth]
            token_path = "/tmp/token.json"

            [upstream]
            endpoint = "https://api.example.com"
            integration_id = "custom-id"
            editor_version = "vscode/1.99.0"
            editor_plugin_version = "copilot-chat/0.30.0"

            [model]
            default_id = "gpt-4.1"
            default_name = "GPT-4.1"

            [log]
            filter = "gateway=debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.listen_address().to_string(), "0.0.0.0:11435");
        assert_eq!(config.auth.token_path.as_deref(), Some(std::path::Path::new("/tmp/token.json")));
        assert_eq!(config.upstream.endpoint.as_deref(), Some("https://api.example.com"));
        assert_eq!(config.upstream.integration_id, "custom-id");
        assert_eq!(config.model.default_id, "gpt-4.1");
        assert_eq!(config.log.filter, "gateway=debug");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let error = toml::from_str::<Config>("[server]\nlisten_addres = \"127.0.0.1:1\"").unwrap_err();

        assert!(error.to_string().contains("listen_addres"));
    }
}
