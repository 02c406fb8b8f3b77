use serde::Deserialize;

/// Default model selection used when an inbound request omits `model`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    /// Model identifier sent upstream.
    pub default_id: String,

    /// Human-readable model name, surfaced in the Ollama tags listing.
    pub default_name: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            default_id: "gpt-4o-2024-11-20".to_string(),
            default_name: "GPT-4o".to_string(),
        }
    }
}
