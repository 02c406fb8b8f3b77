use serde::Deserialize;

/// Identification headers sent with every upstream Copilot request.
///
/// The values are opaque strings owned by configuration; the gateway never
/// interprets them.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpstreamConfig {
    /// Overrides the API endpoint returned by the token exchange.
    ///
    /// Useful for proxied or enterprise deployments.
    pub endpoint: Option<String>,

    /// Value for the `Copilot-Integration-Id` header.
    pub integration_id: String,

    /// Value for the `Editor-Version` header.
    pub editor_version: String,

    /// Value for the `Editor-Plugin-Version` header.
    pub editor_plugin_version: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            integration_id: "vscode-chat".to_string(),
            editor_version: "vscode/1.95.0".to_string(),
            editor_plugin_version: "copilot-chat/0.22.4".to_string(),
        }
    }
}
