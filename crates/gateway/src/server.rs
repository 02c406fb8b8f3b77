//! Shared per-process state for the relay handlers.

use std::sync::Arc;

use crate::{
    auth::{AuthProvider, CopilotAuth},
    model::{ModelProvider, StaticModelProvider},
    upstream::CopilotClient,
};

/// Holds the collaborators every request needs: the credential source, the
/// default model selection and the upstream HTTP client.
pub struct RelayServer {
    pub(crate) auth: Arc<dyn AuthProvider>,
    pub(crate) model: Arc<dyn ModelProvider>,
    pub(crate) upstream: CopilotClient,
}

impl RelayServer {
    /// Builds the production wiring from configuration.
    pub fn new(config: &config::Config) -> Self {
        Self {
            auth: Arc::new(CopilotAuth::new(config)),
            model: Arc::new(StaticModelProvider::from_config(&config.model)),
            upstream: CopilotClient::new(&config.upstream),
        }
    }

    /// Builds a server with injected collaborators, for tests and for
    /// embedders providing their own credential source.
    pub fn with_parts(
        auth: Arc<dyn AuthProvider>,
        model: Arc<dyn ModelProvider>,
        upstream: &config::UpstreamConfig,
    ) -> Self {
        Self {
            auth,
            model,
            upstream: CopilotClient::new(upstream),
        }
    }
}
