//! Copilot Relay gateway: protocol translation between local chat clients
//! and the upstream Copilot Chat Completions endpoint.
//!
//! Four inbound protocols are served — Ollama chat, OpenAI Chat
//! Completions, Anthropic Messages and OpenAI Responses — each through an
//! adapter that converts requests to the upstream format and reconstructs
//! protocol-native responses and stream events from the upstream deltas.

use std::{convert::Infallible, sync::Arc};

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::State,
    http::header,
    response::{IntoResponse, Response, Sse, sse::Event},
    routing::{get, post},
};
use futures::StreamExt;

mod adapter;
pub mod auth;
mod error;
pub mod messages;
pub mod model;
mod pipeline;
mod server;
mod sse;
mod upstream;

use adapter::{AnthropicAdapter, OllamaAdapter, OpenAiAdapter, ResponsesAdapter};
pub use error::{AnthropicErrorResponse, AnthropicResult, GatewayError, GatewayResult as Result};
use pipeline::Dispatched;
pub use server::RelayServer;

use crate::messages::ollama::{TagModel, TagModelDetails, TagsResponse};

/// Creates the axum router serving all relay endpoints.
pub fn router(config: &config::Config) -> anyhow::Result<Router> {
    let server = Arc::new(RelayServer::new(config));
    Ok(router_with(server))
}

/// Creates the router around an existing server, for tests and embedders.
pub fn router_with(server: Arc<RelayServer>) -> Router {
    Router::new()
        .route("/api/tags", get(ollama_tags))
        .route("/api/chat", post(ollama_chat))
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/messages", post(anthropic_messages))
        .route("/v1/responses", post(responses))
        .route("/v1/responses/compact", post(responses))
        .with_state(server)
}

/// Handle Ollama model listing requests.
///
/// The relay serves exactly one model: the current upstream selection.
async fn ollama_tags(State(server): State<Arc<RelayServer>>) -> Json<TagsResponse> {
    let model = server.model.current_model();

    Json(TagsResponse {
        models: vec![TagModel {
            name: model.id.clone(),
            modified_at: jiff::Timestamp::now().to_string(),
            size: 0,
            digest: pseudo_digest(&model.id),
            details: TagModelDetails {
                parent_model: String::new(),
                format: "gguf".to_string(),
                family: "copilot".to_string(),
                families: vec!["copilot".to_string()],
                parameter_size: model.name,
                quantization_level: String::new(),
            },
        }],
    })
}

/// Handle Ollama chat requests.
///
/// Streaming responses are NDJSON: a leading newline, then each frame
/// serialized on its own line and terminated by a blank line.
async fn ollama_chat(State(server): State<Arc<RelayServer>>, body: Bytes) -> Result<Response> {
    log::debug!("Ollama chat handler called");

    match pipeline::dispatch(&server, OllamaAdapter, &body).await? {
        Dispatched::Unary(response) => Ok(Json(response).into_response()),
        Dispatched::Stream(events) => {
            let frames = events.map(|event| {
                let json = serialize_event(&event);
                Ok::<_, Infallible>(Bytes::from(format!("{json}\n\n")))
            });

            let preamble = futures::stream::once(async { Ok::<_, Infallible>(Bytes::from("\n")) });
            let body = Body::from_stream(preamble.chain(frames));

            log::debug!("Returning Ollama streaming response");

            Ok(([(header::CONTENT_TYPE, "application/x-ndjson")], body).into_response())
        }
    }
}

/// Handle OpenAI chat completion requests.
///
/// Streaming responses are SSE frames terminated by `data: [DONE]`.
async fn chat_completions(State(server): State<Arc<RelayServer>>, body: Bytes) -> Result<Response> {
    log::debug!("OpenAI chat completions handler called");

    match pipeline::dispatch(&server, OpenAiAdapter, &body).await? {
        Dispatched::Unary(response) => Ok(Json(response).into_response()),
        Dispatched::Stream(events) => {
            let event_stream = events.map(|chunk| Ok::<_, Infallible>(Event::default().data(serialize_event(&chunk))));

            let with_done = event_stream.chain(futures::stream::once(async {
                Ok::<_, Infallible>(Event::default().data("[DONE]"))
            }));

            log::debug!("Returning OpenAI streaming response");

            Ok(Sse::new(with_done).into_response())
        }
    }
}

/// Handle Anthropic messages requests.
///
/// Streaming responses are SSE frames carrying the typed Anthropic event
/// vocabulary; the stream simply ends, no `[DONE]` marker.
async fn anthropic_messages(State(server): State<Arc<RelayServer>>, body: Bytes) -> AnthropicResult<Response> {
    log::debug!("Anthropic messages handler called");

    match pipeline::dispatch(&server, AnthropicAdapter, &body).await? {
        Dispatched::Unary(response) => Ok(Json(response).into_response()),
        Dispatched::Stream(events) => {
            let event_stream = events.map(|event| Ok::<_, Infallible>(Event::default().data(serialize_event(&event))));

            log::debug!("Returning Anthropic streaming response");

            Ok(Sse::new(event_stream).into_response())
        }
    }
}

/// Handle OpenAI Responses requests, including the compact variant.
///
/// Streaming emits the `response.*` event family; `response.completed` is
/// the last frame.
async fn responses(State(server): State<Arc<RelayServer>>, body: Bytes) -> Result<Response> {
    log::debug!("Responses handler called");

    match pipeline::dispatch(&server, ResponsesAdapter, &body).await? {
        Dispatched::Unary(response) => Ok(Json(response).into_response()),
        Dispatched::Stream(events) => {
            let event_stream = events.map(|event| Ok::<_, Infallible>(Event::default().data(serialize_event(&event))));

            log::debug!("Returning Responses streaming response");

            Ok(Sse::new(event_stream).into_response())
        }
    }
}

fn serialize_event<T: serde::Serialize>(event: &T) -> String {
    sonic_rs::to_string(event).unwrap_or_else(|e| {
        log::error!("Failed to serialize stream event: {e}");
        r#"{"error":"serialization failed"}"#.to_string()
    })
}

/// Stable placeholder digest for the tags listing; Ollama clients expect
/// 64 hex characters but never verify them against content.
fn pseudo_digest(input: &str) -> String {
    let mut hash: u64 = 0xcbf29ce484222325;

    for byte in input.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }

    format!("{hash:016x}").repeat(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pseudo_digest_is_stable_and_sized() {
        let digest = pseudo_digest("gpt-4o-2024-11-20");

        assert_eq!(digest.len(), 64);
        assert_eq!(digest, pseudo_digest("gpt-4o-2024-11-20"));
        assert_ne!(digest, pseudo_digest("gpt-4.1"));
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
