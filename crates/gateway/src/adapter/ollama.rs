//! Adapter for the Ollama chat protocol.
//!
//! Requests are rewritten into the upstream format: base64 `images` become
//! `image_url` content parts with a sniffed MIME type, inbound tool calls
//! are normalized to string arguments, and `options` spread flat into the
//! upstream payload. The streaming side re-frames upstream deltas as NDJSON
//! and reconstructs complete tool calls from argument fragments before the
//! terminal frame.

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::{
    adapter::ProtocolAdapter,
    error::{GatewayError, GatewayResult},
    messages::{
        ollama::{
            ChatRequest, ChatRequestMessage, ChatResponse, RequestToolCall, ResponseFunctionCall, ResponseMessage,
            ResponseToolCall,
        },
        openai::{
            ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ChatRole, ContentPart,
            FunctionCall, ImageUrl, MessageContent, ToolCall, ToolCallDelta, ToolCallType,
        },
    },
    sse::{self, SsePayload},
};

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct OllamaAdapter;

/// One NDJSON frame written to the client.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub(crate) enum OllamaEvent {
    Frame(Box<ChatResponse>),
    Error { error: String, message: String },
}

/// Streaming state for one `/api/chat` request.
///
/// Tool call fragments accumulate keyed by function name, so two calls to
/// the same function in one turn collapse into the newest one. This mirrors
/// Ollama's one-name-one-accumulator semantics and is a known limitation.
#[derive(Debug, Default)]
pub(crate) struct OllamaStreamState {
    model: String,
    created: Option<i64>,
    tools: Vec<ToolAccumulator>,
    current_tool: Option<usize>,
    done_reason: Option<String>,
    usage: Option<crate::messages::openai::Usage>,
    finished: bool,
}

#[derive(Debug)]
struct ToolAccumulator {
    name: String,
    arguments: String,
}

impl ProtocolAdapter for OllamaAdapter {
    type Request = ChatRequest;
    type UnaryResponse = ChatResponse;
    type Event = OllamaEvent;
    type State = OllamaStreamState;

    fn wants_stream(&self, request: &Self::Request) -> bool {
        // Ollama streams unless the client opts out.
        request.stream.unwrap_or(true)
    }

    fn convert_request(&self, request: Self::Request) -> ChatCompletionRequest {
        let messages = request.messages.into_iter().map(convert_message).collect();

        let mut extra = Map::new();

        // Model options spread flat into the upstream payload.
        if let Some(options) = request.options {
            for (key, value) in options {
                extra.insert(key, value);
            }
        }

        ChatCompletionRequest {
            model: request.model,
            messages,
            stream: None,
            tools: request.tools,
            tool_choice: None,
            extra,
        }
    }

    fn detect_vision(&self, request: &Self::Request) -> bool {
        request
            .messages
            .iter()
            .any(|message| message.images.as_ref().is_some_and(|images| !images.is_empty()))
    }

    fn parse_response(&self, body: &str) -> GatewayResult<Self::UnaryResponse> {
        let response: ChatCompletionResponse = sonic_rs::from_str(body)
            .map_err(|e| GatewayError::StreamParse(format!("invalid upstream response: {e}")))?;

        let content: String = response
            .choices
            .iter()
            .filter_map(|choice| choice.message.content.as_deref())
            .collect();

        let tool_calls: Vec<ResponseToolCall> = response
            .choices
            .iter()
            .flat_map(|choice| choice.message.tool_calls.iter().flatten())
            .map(|call| ResponseToolCall {
                function: ResponseFunctionCall {
                    name: call.function.name.clone(),
                    arguments: decode_arguments(&call.function.arguments),
                },
            })
            .collect();

        let usage = response.usage.unwrap_or_default();

        Ok(ChatResponse {
            model: response.model.unwrap_or_default(),
            created_at: created_at(response.created),
            message: ResponseMessage {
                role: ChatRole::Assistant,
                content,
                tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            },
            done: true,
            done_reason: Some("stop".to_string()),
            prompt_eval_count: Some(usage.prompt_tokens),
            eval_count: Some(usage.completion_tokens),
        })
    }

    fn parse_stream_chunk(
        &self,
        buffer: &str,
        state: &mut Self::State,
    ) -> GatewayResult<(Vec<Self::Event>, String)> {
        let (payloads, rest) = sse::split_frames(buffer);
        let mut events = Vec::new();

        for payload in payloads {
            if state.finished {
                break;
            }

            let data = match payload {
                SsePayload::Done => {
                    events.extend(state.finalize());
                    continue;
                }
                SsePayload::Data(data) => data,
            };

            let chunk: ChatCompletionChunk =
                sonic_rs::from_str(&data).map_err(|e| GatewayError::StreamParse(format!("invalid upstream frame: {e}")))?;

            if let Some(model) = chunk.model {
                state.model = model;
            }
            if chunk.created.is_some() {
                state.created = chunk.created;
            }
            if chunk.usage.is_some() {
                state.usage = chunk.usage;
            }

            for choice in chunk.choices {
                if let Some(content) = choice.delta.content
                    && !content.is_empty()
                {
                    events.push(OllamaEvent::Frame(Box::new(state.content_frame(content))));
                }

                for tool_delta in choice.delta.tool_calls.into_iter().flatten() {
                    state.accumulate_tool(tool_delta);
                }

                if choice.finish_reason.is_some() {
                    state.done_reason = Some("stop".to_string());
                }
            }
        }

        Ok((events, rest))
    }

    fn finish_stream(&self, state: &mut Self::State) -> Vec<Self::Event> {
        state.finalize()
    }

    fn error_event(&self, error: &GatewayError) -> Self::Event {
        OllamaEvent::Error {
            error: error.error_type().to_string(),
            message: error.client_message(),
        }
    }
}

impl OllamaStreamState {
    fn content_frame(&self, content: String) -> ChatResponse {
        ChatResponse {
            model: self.model.clone(),
            created_at: created_at(self.created),
            message: ResponseMessage {
                role: ChatRole::Assistant,
                content,
                tool_calls: None,
            },
            done: false,
            done_reason: None,
            prompt_eval_count: None,
            eval_count: None,
        }
    }

    fn accumulate_tool(&mut self, delta: ToolCallDelta) {
        let function = delta.function.unwrap_or_default();

        if let Some(name) = function.name {
            // A newer call carrying a name replaces the prior accumulator
            // under that name.
            match self.tools.iter().position(|tool| tool.name == name) {
                Some(position) => {
                    self.tools[position] = ToolAccumulator {
                        name,
                        arguments: String::new(),
                    };
                    self.current_tool = Some(position);
                }
                None => {
                    self.tools.push(ToolAccumulator {
                        name,
                        arguments: String::new(),
                    });
                    self.current_tool = Some(self.tools.len() - 1);
                }
            }
        }

        if let Some(arguments) = function.arguments
            && !arguments.is_empty()
        {
            match self.current_tool.and_then(|i| self.tools.get_mut(i)) {
                Some(tool) => tool.arguments.push_str(&arguments),
                None => log::warn!("Skipping tool call arguments that arrived before any function name"),
            }
        }
    }

    /// Emits the end-of-stream frames: one frame carrying the completed
    /// tool calls when any accumulated, then the terminal `done: true`
    /// frame with the recorded usage. Idempotent.
    fn finalize(&mut self) -> Vec<OllamaEvent> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;

        let mut frames = Vec::new();

        if !self.tools.is_empty() {
            let calls = self
                .tools
                .drain(..)
                .map(|tool| ResponseToolCall {
                    function: ResponseFunctionCall {
                        name: tool.name,
                        arguments: decode_arguments(&tool.arguments),
                    },
                })
                .collect();

            frames.push(OllamaEvent::Frame(Box::new(ChatResponse {
                model: self.model.clone(),
                created_at: created_at(self.created),
                message: ResponseMessage {
                    role: ChatRole::Assistant,
                    content: String::new(),
                    tool_calls: Some(calls),
                },
                done: false,
                done_reason: None,
                prompt_eval_count: None,
                eval_count: None,
            })));
        }

        let usage = self.usage.unwrap_or_default();

        frames.push(OllamaEvent::Frame(Box::new(ChatResponse {
            model: self.model.clone(),
            created_at: created_at(self.created),
            message: ResponseMessage {
                role: ChatRole::Assistant,
                content: String::new(),
                tool_calls: None,
            },
            done: true,
            done_reason: Some(self.done_reason.clone().unwrap_or_else(|| "stop".to_string())),
            prompt_eval_count: Some(usage.prompt_tokens),
            eval_count: Some(usage.completion_tokens),
        })));

        frames
    }
}

fn convert_message(message: ChatRequestMessage) -> ChatMessage {
    let ChatRequestMessage {
        role,
        content,
        images,
        tool_calls,
        tool_call_id,
        name,
    } = message;

    let content = match images {
        Some(images) if !images.is_empty() => {
            let mut parts = vec![ContentPart::Text { text: content }];

            for image in images {
                parts.push(ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: format!("data:{};base64,{image}", detect_image_mime(&image)),
                        detail: None,
                    },
                });
            }

            MessageContent::Parts(parts)
        }
        _ => MessageContent::Text(content),
    };

    let tool_calls = tool_calls.map(|calls| calls.into_iter().map(normalize_tool_call).collect());

    // Only tool result messages carry the call id and participant name.
    let (tool_call_id, name) = match role {
        ChatRole::Tool | ChatRole::Function => (tool_call_id, name),
        _ => (None, None),
    };

    ChatMessage {
        role,
        content: Some(content),
        tool_calls,
        tool_call_id,
        name,
        extra: Map::new(),
    }
}

fn normalize_tool_call(call: RequestToolCall) -> ToolCall {
    let arguments = match call.function.arguments {
        Value::String(s) => s,
        value => serde_json::to_string(&value).unwrap_or_else(|_| "{}".to_string()),
    };

    ToolCall {
        id: call.id.unwrap_or_else(mint_call_id),
        call_type: ToolCallType::Function,
        function: FunctionCall {
            name: call.function.name,
            arguments,
        },
    }
}

fn mint_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

/// Sniffs the image MIME type from the leading characters of the base64
/// payload. JPEG is the fallback for unknown prefixes.
fn detect_image_mime(data: &str) -> &'static str {
    if data.starts_with("/9j/") {
        "image/jpeg"
    } else if data.starts_with("iVBOR") {
        "image/png"
    } else if data.starts_with("R0lGO") {
        "image/gif"
    } else if data.starts_with("UklGR") {
        "image/webp"
    } else {
        "image/jpeg"
    }
}

fn decode_arguments(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| json!({ "arguments": raw }))
}

fn created_at(created: Option<i64>) -> String {
    jiff::Timestamp::from_second(created.unwrap_or(0))
        .unwrap_or(jiff::Timestamp::UNIX_EPOCH)
        .to_string()
}
