//! The protocol adapter capability shared by all four translators.
//!
//! Adapters are stateless singletons: all mutable parsing state lives in the
//! per-request [`ProtocolAdapter::State`] owned by the pipeline. Every
//! method is synchronous; the pipeline performs all I/O.

use serde::{Serialize, de::DeserializeOwned};

use crate::{
    error::GatewayResult,
    messages::openai::ChatCompletionRequest,
};

pub(crate) mod anthropic;
pub(crate) mod ollama;
pub(crate) mod openai;
pub(crate) mod responses;

pub(crate) use anthropic::AnthropicAdapter;
pub(crate) use ollama::OllamaAdapter;
pub(crate) use openai::OpenAiAdapter;
pub(crate) use responses::ResponsesAdapter;

/// Bidirectional, streaming-aware translation between one public protocol
/// and the upstream Chat Completions protocol.
pub(crate) trait ProtocolAdapter: Copy + Send + Sync + 'static {
    /// The decoded inbound request.
    type Request: DeserializeOwned + Send;

    /// The unary response body returned to the client.
    type UnaryResponse: Serialize + Send;

    /// One adapter-native event emitted on a streaming response.
    type Event: Serialize + Send;

    /// Per-request parsing state, created empty by the dispatcher.
    type State: Default + Send;

    /// Whether the client asked for a streaming response.
    fn wants_stream(&self, request: &Self::Request) -> bool;

    /// Converts the inbound request into a self-contained upstream payload.
    ///
    /// Malformed pieces are converted as far as possible; unknown content
    /// parts are dropped silently. The model field may be left empty for
    /// the pipeline to fill.
    fn convert_request(&self, request: Self::Request) -> ChatCompletionRequest;

    /// True iff any message carries an image content part native to the
    /// protocol. The pipeline sets the `Copilot-Vision-Request` header.
    fn detect_vision(&self, request: &Self::Request) -> bool;

    /// Translates a complete upstream response body.
    fn parse_response(&self, body: &str) -> GatewayResult<Self::UnaryResponse>;

    /// Consumes complete SSE frames from `buffer`, advancing `state`.
    ///
    /// Returns the events to deliver and the unconsumed tail of the buffer.
    /// A `data:` payload that fails JSON decoding is fatal for the request.
    fn parse_stream_chunk(&self, buffer: &str, state: &mut Self::State)
    -> GatewayResult<(Vec<Self::Event>, String)>;

    /// Drains the stream at EOF, closing any state left open when the
    /// `[DONE]` sentinel never arrived. Terminal events are emitted at most
    /// once across `parse_stream_chunk` and this call.
    fn finish_stream(&self, state: &mut Self::State) -> Vec<Self::Event>;

    /// The adapter-native error frame written when a stream fails after
    /// bytes have already been sent.
    fn error_event(&self, error: &crate::error::GatewayError) -> Self::Event;
}
