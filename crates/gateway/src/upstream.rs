//! HTTP transport to the upstream Copilot chat endpoint.

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use secrecy::ExposeSecret;

use crate::{
    auth::UpstreamCredentials,
    error::{GatewayError, GatewayResult},
    messages::openai::ChatCompletionRequest,
};

/// Upstream error bodies are trimmed to this many bytes in client-facing
/// messages.
const ERROR_EXCERPT_LIMIT: usize = 256;

/// Client for the upstream Chat Completions endpoint.
///
/// Carries the editor identification headers from configuration; the
/// bearer token and endpoint come from the per-request credentials.
pub(crate) struct CopilotClient {
    client: reqwest::Client,
    integration_id: String,
    editor_version: String,
    editor_plugin_version: String,
    endpoint_override: Option<String>,
}

impl CopilotClient {
    pub fn new(config: &config::UpstreamConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            integration_id: config.integration_id.clone(),
            editor_version: config.editor_version.clone(),
            editor_plugin_version: config.editor_plugin_version.clone(),
            endpoint_override: config.endpoint.clone(),
        }
    }

    /// Sends a chat completion request, streaming or unary.
    ///
    /// Returns the open response on 2xx; non-2xx statuses map to the
    /// corresponding error kind with a body excerpt.
    pub async fn chat_completions(
        &self,
        credentials: &UpstreamCredentials,
        request: &ChatCompletionRequest,
        vision: bool,
    ) -> GatewayResult<reqwest::Response> {
        let endpoint = self
            .endpoint_override
            .as_deref()
            .unwrap_or(&credentials.endpoint)
            .trim_end_matches('/');

        let url = format!("{endpoint}/chat/completions");

        let body = sonic_rs::to_vec(request)
            .map_err(|e| GatewayError::Internal(Some(format!("failed to serialize upstream request: {e}"))))?;

        let mut request_builder = self
            .client
            .post(url)
            .header(AUTHORIZATION, format!("Bearer {}", credentials.token.expose_secret()))
            .header(CONTENT_TYPE, "application/json")
            .header("Copilot-Integration-Id", &self.integration_id)
            .header("Editor-Version", &self.editor_version)
            .header("Editor-Plugin-Version", &self.editor_plugin_version);

        if vision {
            request_builder = request_builder.header("Copilot-Vision-Request", "true");
        }

        let response = request_builder
            .body(body)
            .send()
            .await
            .map_err(|e| GatewayError::Connection(format!("failed to reach upstream: {e}")))?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "<empty response>".to_string());
            log::error!("Upstream API error ({status}): {error_text}");

            let excerpt = excerpt(&error_text);

            return Err(match status.as_u16() {
                401 => GatewayError::Authentication(excerpt),
                code => GatewayError::UpstreamStatus {
                    status: code,
                    message: excerpt,
                },
            });
        }

        Ok(response)
    }
}

fn excerpt(text: &str) -> String {
    let mut limit = ERROR_EXCERPT_LIMIT.min(text.len());

    while !text.is_char_boundary(limit) {
        limit -= 1;
    }

    text[..limit].to_string()
}
