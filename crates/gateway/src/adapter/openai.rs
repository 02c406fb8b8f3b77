//! Pass-through adapter for the OpenAI Chat Completions protocol.
//!
//! The inbound protocol already matches the upstream, so requests and
//! unary responses pass through unchanged. Streaming strips the SSE
//! framing and the `[DONE]` sentinel; the pipeline re-frames each event
//! and appends its own terminator.

use serde_json::{Value, json};

use crate::{
    adapter::ProtocolAdapter,
    error::{GatewayError, GatewayResult},
    messages::openai::{ChatCompletionRequest, ContentPart, MessageContent},
    sse::{self, SsePayload},
};

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct OpenAiAdapter;

/// Streaming state: the only thing to remember is whether the upstream
/// already terminated, so frames after `[DONE]` are not forwarded.
#[derive(Debug, Default)]
pub(crate) struct OpenAiStreamState {
    done: bool,
}

impl ProtocolAdapter for OpenAiAdapter {
    type Request = ChatCompletionRequest;
    type UnaryResponse = Value;
    type Event = Value;
    type State = OpenAiStreamState;

    fn wants_stream(&self, request: &Self::Request) -> bool {
        request.stream.unwrap_or(false)
    }

    fn convert_request(&self, request: Self::Request) -> ChatCompletionRequest {
        request
    }

    fn detect_vision(&self, request: &Self::Request) -> bool {
        request.messages.iter().any(|message| {
            let Some(MessageContent::Parts(parts)) = &message.content else {
                return false;
            };

            parts.iter().any(|part| matches!(part, ContentPart::ImageUrl { .. }))
        })
    }

    fn parse_response(&self, body: &str) -> GatewayResult<Self::UnaryResponse> {
        sonic_rs::from_str(body).map_err(|e| GatewayError::StreamParse(format!("invalid upstream response: {e}")))
    }

    fn parse_stream_chunk(
        &self,
        buffer: &str,
        state: &mut Self::State,
    ) -> GatewayResult<(Vec<Self::Event>, String)> {
        let (payloads, rest) = sse::split_frames(buffer);
        let mut events = Vec::new();

        for payload in payloads {
            if state.done {
                break;
            }

            match payload {
                SsePayload::Done => state.done = true,
                SsePayload::Data(data) => {
                    let chunk: Value = sonic_rs::from_str(&data)
                        .map_err(|e| GatewayError::StreamParse(format!("invalid upstream frame: {e}")))?;

                    events.push(chunk);
                }
            }
        }

        Ok((events, rest))
    }

    fn finish_stream(&self, state: &mut Self::State) -> Vec<Self::Event> {
        state.done = true;
        Vec::new()
    }

    fn error_event(&self, error: &GatewayError) -> Self::Event {
        json!({
            "error": error.error_type(),
            "message": error.client_message(),
        })
    }
}
