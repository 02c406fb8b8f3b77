//! Default model selection.
//!
//! Model discovery and user-facing selection live outside the gateway; the
//! pipeline only needs one current model to fall back to when an inbound
//! request omits `model`.

/// Hard-coded fallback when no model is configured.
pub(crate) const FALLBACK_MODEL_ID: &str = "gpt-4o-2024-11-20";
pub(crate) const FALLBACK_MODEL_NAME: &str = "GPT-4o";

/// The currently selected model.
#[derive(Debug, Clone)]
pub struct SelectedModel {
    /// Model identifier sent upstream.
    pub id: String,

    /// Human-readable name, surfaced in the Ollama tags listing.
    pub name: String,
}

/// Source of the current default model.
pub trait ModelProvider: Send + Sync {
    fn current_model(&self) -> SelectedModel;
}

/// Provider serving the configured default model.
pub struct StaticModelProvider {
    model: SelectedModel,
}

impl StaticModelProvider {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let id = id.into();
        let name = name.into();

        let model = if id.is_empty() {
            SelectedModel {
                id: FALLBACK_MODEL_ID.to_string(),
                name: FALLBACK_MODEL_NAME.to_string(),
            }
        } else {
            SelectedModel { id, name }
        };

        Self { model }
    }

    pub fn from_config(config: &config::ModelConfig) -> Self {
        Self::new(config.default_id.clone(), config.default_name.clone())
    }
}

impl ModelProvider for StaticModelProvider {
    fn current_model(&self) -> SelectedModel {
        self.model.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_model_is_served() {
        let provider = StaticModelProvider::new("gpt-4.1", "GPT-4.1");
        let model = provider.current_model();

        assert_eq!(model.id, "gpt-4.1");
        assert_eq!(model.name, "GPT-4.1");
    }

    #[test]
    fn empty_id_falls_back() {
        let provider = StaticModelProvider::new("", "");
        let model = provider.current_model();

        assert_eq!(model.id, FALLBACK_MODEL_ID);
        assert_eq!(model.name, FALLBACK_MODEL_NAME);
    }
}
