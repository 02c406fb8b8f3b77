//! Adapter for the Anthropic Messages protocol.
//!
//! Request conversion flattens Anthropic's typed content blocks into the
//! upstream message shape. The streaming side rebuilds Anthropic's stateful
//! event life-cycle (`message_start`, `content_block_start/delta/stop`,
//! `message_delta`, `message_stop`) from the flat upstream choice deltas.
//!
//! Cached prompt tokens are billed separately: `input_tokens` reports only
//! uncached prompt tokens and `cache_read_input_tokens` carries the rest,
//! so the two always sum to the upstream prompt token count.

use serde_json::{Map, Value, json};

use crate::{
    adapter::ProtocolAdapter,
    error::{GatewayError, GatewayResult},
    messages::{
        anthropic::{
            BlockDelta, ContentBlock, ErrorDetails, InputContent, InputMessage, MessageDeltaData, MessageStart,
            MessagesRequest, MessagesResponse, ResponseBlock, Role, StartBlock, StopReason, StreamEvent, Usage,
        },
        openai::{
            ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ChatRole, ContentPart,
            FinishReason, FunctionCall, ImageUrl, MessageContent, ToolCall, ToolCallType,
        },
    },
    sse::{self, SsePayload},
};

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct AnthropicAdapter;

/// The kind of content block currently open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Text,
    ToolUse,
}

/// Streaming state for one `/v1/messages` request.
///
/// Tool accumulators are keyed by function name, so two calls to the same
/// function in one turn collapse into a single block. Known limitation,
/// shared with the Ollama adapter.
#[derive(Debug)]
pub(crate) struct AnthropicStreamState {
    started: bool,
    block_open: bool,
    current_index: i32,
    current_kind: Option<BlockKind>,
    seen_functions: Vec<String>,
    message_id: String,
    model: String,
    input_tokens: u32,
    cached_tokens: u32,
    output_tokens: u32,
    stop_reason: Option<StopReason>,
    finished: bool,
}

impl Default for AnthropicStreamState {
    fn default() -> Self {
        Self {
            started: false,
            block_open: false,
            current_index: -1,
            current_kind: None,
            seen_functions: Vec::new(),
            message_id: String::new(),
            model: String::new(),
            input_tokens: 0,
            cached_tokens: 0,
            output_tokens: 0,
            stop_reason: None,
            finished: false,
        }
    }
}

impl ProtocolAdapter for AnthropicAdapter {
    type Request = MessagesRequest;
    type UnaryResponse = MessagesResponse;
    type Event = StreamEvent;
    type State = AnthropicStreamState;

    fn wants_stream(&self, request: &Self::Request) -> bool {
        // Absence means a unary response.
        request.stream.unwrap_or(false)
    }

    fn convert_request(&self, request: Self::Request) -> ChatCompletionRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);

        if let Some(system) = request.system {
            messages.push(ChatMessage::text(ChatRole::System, system.into_text()));
        }

        for message in request.messages {
            messages.push(convert_message(message));
        }

        let tools = request.tools.map(|tools| {
            tools
                .into_iter()
                .map(|tool| {
                    let mut function = Map::new();
                    function.insert("name".to_string(), Value::String(tool.name));

                    if let Some(description) = tool.description {
                        function.insert("description".to_string(), Value::String(description));
                    }

                    if let Some(input_schema) = tool.input_schema {
                        function.insert("parameters".to_string(), input_schema);
                    }

                    json!({ "type": "function", "function": function })
                })
                .collect()
        });

        let mut extra = Map::new();

        if let Some(max_tokens) = request.max_tokens {
            extra.insert("max_tokens".to_string(), Value::from(max_tokens));
        }
        if let Some(temperature) = request.temperature {
            extra.insert("temperature".to_string(), Value::from(temperature));
        }
        if let Some(top_p) = request.top_p {
            extra.insert("top_p".to_string(), Value::from(top_p));
        }
        if let Some(top_k) = request.top_k {
            extra.insert("top_k".to_string(), Value::from(top_k));
        }

        ChatCompletionRequest {
            model: request.model,
            messages,
            stream: None,
            tools,
            tool_choice: None,
            extra,
        }
    }

    fn detect_vision(&self, request: &Self::Request) -> bool {
        request.messages.iter().any(|message| {
            let InputContent::Blocks(blocks) = &message.content else {
                return false;
            };

            blocks.iter().any(|block| matches!(block, ContentBlock::Image { .. }))
        })
    }

    fn parse_response(&self, body: &str) -> GatewayResult<Self::UnaryResponse> {
        let response: ChatCompletionResponse = sonic_rs::from_str(body)
            .map_err(|e| GatewayError::StreamParse(format!("invalid upstream response: {e}")))?;

        let text: String = response
            .choices
            .iter()
            .filter_map(|choice| choice.message.content.as_deref())
            .collect();

        let mut content = Vec::new();

        if !text.is_empty() {
            content.push(ResponseBlock::Text { text });
        }

        for call in response
            .choices
            .iter()
            .flat_map(|choice| choice.message.tool_calls.iter().flatten())
        {
            content.push(ResponseBlock::ToolUse {
                id: call.id.clone(),
                name: call.function.name.clone(),
                input: decode_tool_input(&call.function.arguments),
            });
        }

        let stop_reason = response
            .choices
            .iter()
            .find_map(|choice| choice.finish_reason.clone())
            .map(map_stop_reason)
            .unwrap_or(StopReason::EndTurn);

        let usage = response.usage.unwrap_or_default();

        Ok(MessagesResponse {
            id: response.id.unwrap_or_else(mint_message_id),
            r#type: "message".to_string(),
            role: "assistant".to_string(),
            content,
            model: response.model.unwrap_or_default(),
            stop_reason: Some(stop_reason),
            stop_sequence: None,
            usage: Usage {
                input_tokens: usage.billable_prompt_tokens(),
                output_tokens: usage.completion_tokens,
                cache_read_input_tokens: usage.cached_tokens(),
                cache_creation_input_tokens: 0,
            },
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

            state.process_chunk(chunk, &mut events);
        }

        Ok((events, rest))
    }

    fn finish_stream(&self, state: &mut Self::State) -> Vec<Self::Event> {
        state.finalize()
    }

    fn error_event(&self, error: &GatewayError) -> Self::Event {
        let error_type = match error {
            GatewayError::InvalidRequest(_) => "invalid_request_error",
            GatewayError::Authentication(_) => "authentication_error",
            _ => "api_error",
        };

        StreamEvent::Error {
            error: ErrorDetails {
                r#type: error_type.to_string(),
                message: error.client_message(),
            },
        }
    }
}

impl AnthropicStreamState {
    fn process_chunk(&mut self, chunk: ChatCompletionChunk, events: &mut Vec<StreamEvent>) {
        if !self.started {
            self.started = true;
            self.message_id = mint_message_id();
            self.model = chunk.model.clone().unwrap_or_default();

            if let Some(usage) = &chunk.usage {
                self.input_tokens = usage.billable_prompt_tokens();
                self.cached_tokens = usage.cached_tokens();
            }

            events.push(StreamEvent::MessageStart {
                message: MessageStart {
                    id: self.message_id.clone(),
                    r#type: "message".to_string(),
                    role: "assistant".to_string(),
                    content: vec![],
                    model: self.model.clone(),
                    stop_reason: None,
                    stop_sequence: None,
                    usage: Usage {
                        input_tokens: self.input_tokens,
                        output_tokens: 0,
                        cache_read_input_tokens: self.cached_tokens,
                        cache_creation_input_tokens: 0,
                    },
                },
            });
        }

        if let Some(usage) = &chunk.usage {
            self.input_tokens = usage.billable_prompt_tokens();
            self.cached_tokens = usage.cached_tokens();
            self.output_tokens = usage.completion_tokens;
        }

        let Some(choice) = chunk.choices.into_iter().next() else {
            return;
        };

        if let Some(content) = choice.delta.content
            && !content.is_empty()
        {
            if !self.block_open {
                self.current_index += 1;
                self.block_open = true;
                self.current_kind = Some(BlockKind::Text);

                events.push(StreamEvent::ContentBlockStart {
                    index: self.index(),
                    content_block: StartBlock::Text { text: String::new() },
                });
            }

            events.push(StreamEvent::ContentBlockDelta {
                index: self.index(),
                delta: BlockDelta::TextDelta { text: content },
            });
        }

        for tool_delta in choice.delta.tool_calls.into_iter().flatten() {
            let function = tool_delta.function.unwrap_or_default();

            if let Some(name) = function.name
                && !self.seen_functions.contains(&name)
            {
                self.seen_functions.push(name.clone());

                // Only an open text block is closed before the tool block
                // starts; a preceding tool block stays open until the end
                // of the stream.
                if self.block_open && self.current_kind == Some(BlockKind::Text) {
                    events.push(StreamEvent::ContentBlockStop { index: self.index() });
                    self.block_open = false;
                }

                self.current_index += 1;
                self.block_open = true;
                self.current_kind = Some(BlockKind::ToolUse);

                events.push(StreamEvent::ContentBlockStart {
                    index: self.index(),
                    content_block: StartBlock::ToolUse {
                        id: tool_delta.id.unwrap_or_else(mint_call_id),
                        name,
                        input: json!({}),
                    },
                });
            }

            if let Some(arguments) = function.arguments
                && !arguments.is_empty()
            {
                if self.block_open && self.current_kind == Some(BlockKind::ToolUse) {
                    events.push(StreamEvent::ContentBlockDelta {
                        index: self.index(),
                        delta: BlockDelta::InputJsonDelta { partial_json: arguments },
                    });
                } else {
                    log::warn!("Skipping tool call arguments that arrived before any tool block");
                }
            }
        }

        if let Some(reason) = choice.finish_reason {
            self.stop_reason = Some(map_stop_reason(reason));
        }
    }

    /// Emits the closing events: `content_block_stop` for a still-open
    /// block, `message_delta` with the stop reason and final usage, then
    /// `message_stop`. Idempotent, and a no-op for streams that never
    /// produced a frame.
    fn finalize(&mut self) -> Vec<StreamEvent> {
        if self.finished || !self.started {
            self.finished = true;
            return Vec::new();
        }
        self.finished = true;

        let mut events = Vec::new();

        if self.block_open {
            events.push(StreamEvent::ContentBlockStop { index: self.index() });
            self.block_open = false;
        }

        events.push(StreamEvent::MessageDelta {
            delta: MessageDeltaData {
                stop_reason: Some(self.stop_reason.unwrap_or(StopReason::EndTurn)),
                stop_sequence: None,
            },
            usage: Usage {
                input_tokens: self.input_tokens,
                output_tokens: self.output_tokens,
                cache_read_input_tokens: self.cached_tokens,
                cache_creation_input_tokens: 0,
            },
        });

        events.push(StreamEvent::MessageStop);

        events
    }

    fn index(&self) -> u32 {
        u32::try_from(self.current_index).unwrap_or(0)
    }
}

fn convert_message(message: InputMessage) -> ChatMessage {
    let role = match message.role {
        Role::User => ChatRole::User,
        Role::Assistant => ChatRole::Assistant,
    };

    let blocks = match message.content {
        InputContent::Text(text) => {
            return ChatMessage::text(role, text);
        }
        InputContent::Blocks(blocks) => blocks,
    };

    let mut parts = Vec::new();
    let mut has_image = false;
    let mut tool_calls = Vec::new();

    for block in blocks {
        match block {
            ContentBlock::Text { text } => parts.push(ContentPart::Text { text }),
            ContentBlock::Image { source } => {
                has_image = true;

                let media_type = source.media_type.as_deref().unwrap_or("image/jpeg");

                parts.push(ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: format!("data:{media_type};base64,{}", source.data),
                        detail: None,
                    },
                });
            }
            ContentBlock::ToolUse { id, name, input } => {
                tool_calls.push(ToolCall {
                    id,
                    call_type: ToolCallType::Function,
                    function: FunctionCall {
                        name,
                        arguments: serde_json::to_string(&input).unwrap_or_else(|_| "{}".to_string()),
                    },
                });
            }
            // The upstream expects OpenAI-style tool results; the original
            // gateway encodes them as a tool-call-shaped entry on the user
            // message, and that shape is preserved here.
            ContentBlock::ToolResult { tool_use_id, content } => {
                tool_calls.push(ToolCall {
                    id: tool_use_id,
                    call_type: ToolCallType::Function,
                    function: FunctionCall {
                        name: "tool_result".to_string(),
                        arguments: tool_result_output(content),
                    },
                });
            }
            ContentBlock::Other(_) => {}
        }
    }

    let content = if parts.is_empty() {
        None
    } else if has_image {
        Some(MessageContent::Parts(parts))
    } else {
        let text = parts
            .into_iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        Some(MessageContent::Text(text))
    };

    ChatMessage {
        role,
        content,
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        tool_call_id: None,
        name: None,
        extra: Map::new(),
    }
}

/// Collapses a tool_result content value into the output string carried by
/// the pseudo tool call.
fn tool_result_output(content: Value) -> String {
    match &content {
        Value::String(text) => text.clone(),
        Value::Array(blocks) => {
            let texts: Vec<&str> = blocks
                .iter()
                .filter_map(|block| block.get("text").and_then(Value::as_str))
                .collect();

            if texts.is_empty() {
                serde_json::to_string(&content).unwrap_or_else(|_| "\"\"".to_string())
            } else {
                texts.join("\n")
            }
        }
        _ => serde_json::to_string(&content).unwrap_or_else(|_| "\"\"".to_string()),
    }
}

fn map_stop_reason(reason: FinishReason) -> StopReason {
    match reason {
        FinishReason::Stop => StopReason::EndTurn,
        FinishReason::Length => StopReason::MaxTokens,
        FinishReason::ToolCalls | FinishReason::FunctionCall => StopReason::ToolUse,
        FinishReason::ContentFilter => StopReason::Refusal,
        FinishReason::Other(other) => {
            log::warn!("Unknown upstream finish reason: {other}");
            StopReason::EndTurn
        }
    }
}

fn decode_tool_input(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| json!({ "arguments": raw }))
}

fn mint_message_id() -> String {
    format!("msg_{}", uuid::Uuid::new_v4().simple())
}

fn mint_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn events_to_values(events: &[StreamEvent]) -> Vec<Value> {
        events.iter().map(|e| serde_json::to_value(e).unwrap()).collect()
    }

    #[test]
    fn system_prompt_becomes_first_message() {
        let request: MessagesRequest = serde_json::from_value(json!({
            "model": "gpt-4o",
            "system": "Be brief.",
            "messages": [{"role": "user", "content": "Hello"}],
            "max_tokens": 512,
            "temperature": 0.5,
            "top_p": 0.9,
            "top_k": 40
        }))
        .unwrap();

        let converted = AnthropicAdapter.convert_request(request);
        let value = serde_json::to_value(&converted).unwrap();

        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][0]["content"], "Be brief.");
        assert_eq!(value["messages"][1]["role"], "user");
        assert_eq!(value["max_tokens"], 512);
        assert_eq!(value["temperature"], 0.5);
        assert_eq!(value["top_p"], 0.9);
        assert_eq!(value["top_k"], 40);
    }

    #[test]
    fn tool_use_block_becomes_tool_call() {
        let request: MessagesRequest = serde_json::from_value(json!({
            "messages": [{
                "role": "assistant",
                "content": [
                    {"type": "text", "text": "Let me check."},
                    {"type": "tool_use", "id": "toolu_1", "name": "get_weather", "input": {"location": "Beijing"}}
                ]
            }]
        }))
        .unwrap();

        let converted = AnthropicAdapter.convert_request(request);
        let message = &converted.messages[0];

        assert!(matches!(&message.content, Some(MessageContent::Text(t)) if t == "Let me check."));

        let calls = message.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].id, "toolu_1");
        assert_eq!(calls[0].function.name, "get_weather");
        assert_eq!(
            serde_json::from_str::<Value>(&calls[0].function.arguments).unwrap(),
            json!({"location": "Beijing"})
        );
    }

    #[test]
    fn tool_result_block_becomes_pseudo_tool_call() {
        let request: MessagesRequest = serde_json::from_value(json!({
            "messages": [{
                "role": "user",
                "content": [{
                    "type": "tool_result",
                    "tool_use_id": "toolu_1",
                    "content": [{"type": "text", "text": "22 degrees"}]
                }]
            }]
        }))
        .unwrap();

        let converted = AnthropicAdapter.convert_request(request);
        let message = &converted.messages[0];

        assert_eq!(serde_json::to_value(&message.role).unwrap(), json!("user"));

        let calls = message.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].id, "toolu_1");
        assert_eq!(calls[0].function.name, "tool_result");
        assert_eq!(calls[0].function.arguments, "22 degrees");
    }

    #[test]
    fn image_block_becomes_data_url() {
        let request: MessagesRequest = serde_json::from_value(json!({
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": "what?"},
                    {"type": "image", "source": {"type": "base64", "media_type": "image/png", "data": "iVBOR"}},
                    {"type": "image", "source": {"type": "base64", "data": "abcd"}}
                ]
            }]
        }))
        .unwrap();

        assert!(AnthropicAdapter.detect_vision(&request));

        let converted = AnthropicAdapter.convert_request(request);
        let value = serde_json::to_value(&converted).unwrap();

        assert_eq!(value["messages"][0]["content"][1]["image_url"]["url"], "data:image/png;base64,iVBOR");
        // Missing media type falls back to JPEG.
        assert_eq!(value["messages"][0]["content"][2]["image_url"]["url"], "data:image/jpeg;base64,abcd");
    }

    #[test]
    fn tools_map_input_schema_to_parameters() {
        let request: MessagesRequest = serde_json::from_value(json!({
            "messages": [],
            "tools": [{
                "name": "get_weather",
                "description": "Get the weather",
                "input_schema": {"type": "object", "properties": {"location": {"type": "string"}}, "required": ["location"]}
            }]
        }))
        .unwrap();

        let converted = AnthropicAdapter.convert_request(request);
        let tools = converted.tools.unwrap();

        assert_eq!(tools[0]["type"], "function");
        assert_eq!(tools[0]["function"]["name"], "get_weather");
        assert_eq!(tools[0]["function"]["parameters"]["type"], "object");
        assert_eq!(tools[0]["function"]["parameters"]["required"][0], "location");
    }

    #[test]
    fn unknown_blocks_are_dropped() {
        let request: MessagesRequest = serde_json::from_value(json!({
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": "keep"},
                    {"type": "document", "source": {"data": "drop"}}
                ]
            }]
        }))
        .unwrap();

        let converted = AnthropicAdapter.convert_request(request);

        assert!(matches!(&converted.messages[0].content, Some(MessageContent::Text(t)) if t == "keep"));
    }

    #[test]
    fn stream_flag_defaults_to_unary() {
        let request: MessagesRequest = serde_json::from_value(json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "hi"}]
        }))
        .unwrap();

        assert!(!AnthropicAdapter.wants_stream(&request));
    }

    #[test]
    fn simple_text_stream_produces_text_block_lifecycle() {
        let stream = concat!(
            "data: {\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"Hello \"}}],\"usage\":{\"prompt_tokens\":5,\"completion_tokens\":0,\"total_tokens\":5}}\n\n",
            "data: {\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"world.\"}}]}\n\n",
            "data: {\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}],\"usage\":{\"prompt_tokens\":5,\"completion_tokens\":2,\"total_tokens\":7}}\n\n",
            "data: [DONE]\n\n",
        );

        let mut state = AnthropicStreamState::default();
        let (events, _) = AnthropicAdapter.parse_stream_chunk(stream, &mut state).unwrap();
        let values = events_to_values(&events);

        let types: Vec<&str> = values.iter().map(|v| v["type"].as_str().unwrap()).collect();
        assert_eq!(
            types,
            vec![
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );

        // Initial usage comes from the first frame.
        assert_eq!(values[0]["message"]["usage"]["input_tokens"], 5);
        assert_eq!(values[0]["message"]["usage"]["output_tokens"], 0);
        assert!(values[0]["message"]["id"].as_str().unwrap().starts_with("msg_"));
        assert_eq!(values[0]["message"]["model"], "gpt-4o");

        assert_eq!(values[1]["content_block"]["type"], "text");
        assert_eq!(values[1]["content_block"]["text"], "");
        assert_eq!(values[2]["delta"]["type"], "text");
        assert_eq!(values[2]["delta"]["text"], "Hello ");
        assert_eq!(values[3]["delta"]["type"], "text");
        assert_eq!(values[3]["delta"]["text"], "world.");

        assert_eq!(values[5]["delta"]["stop_reason"], "end_turn");
        assert_eq!(values[5]["usage"]["output_tokens"], 2);
    }

    const TOOL_USE_STREAM: &str = concat!(
        "data: {\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"tool_calls\":[{\"index\":0,\"function\":{\"name\":\"get_weather\",\"arguments\":\"\"}}]}}]}\n\n",
        "data: {\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"{\\\"loc\"}}]}}]}\n\n",
        "data: {\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"ation\\\":\\\"Beijing\\\"}\"}}]}}]}\n\n",
        "data: {\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"tool_calls\"}],\"usage\":{\"prompt_tokens\":100,\"completion_tokens\":20,\"total_tokens\":120}}\n\n",
        "data: [DONE]\n\n",
    );

    #[test]
    fn tool_use_stream_produces_block_lifecycle() {
        let mut state = AnthropicStreamState::default();
        let (events, rest) = AnthropicAdapter.parse_stream_chunk(TOOL_USE_STREAM, &mut state).unwrap();
        let values = events_to_values(&events);

        assert_eq!(rest, "");

        let types: Vec<&str> = values.iter().map(|v| v["type"].as_str().unwrap()).collect();
        assert_eq!(
            types,
            vec![
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );

        let start = &values[1];
        assert_eq!(start["index"], 0);
        assert_eq!(start["content_block"]["type"], "tool_use");
        assert_eq!(start["content_block"]["name"], "get_weather");
        assert!(start["content_block"]["id"].as_str().unwrap().starts_with("call_"));
        assert_eq!(start["content_block"]["input"], json!({}));

        for value in &values[2..4] {
            assert_eq!(value["delta"]["type"], "input_json_delta");
        }

        let partial: String = values[2..4]
            .iter()
            .map(|v| v["delta"]["partial_json"].as_str().unwrap())
            .collect();
        assert_eq!(partial, "{\"location\":\"Beijing\"}");

        let delta = &values[5];
        assert_eq!(delta["delta"]["stop_reason"], "tool_use");
        assert_eq!(delta["delta"]["stop_sequence"], Value::Null);
        assert_eq!(delta["usage"]["input_tokens"], 100);
        assert_eq!(delta["usage"]["output_tokens"], 20);
        assert_eq!(delta["usage"]["cache_read_input_tokens"], 0);
        assert_eq!(delta["usage"]["cache_creation_input_tokens"], 0);
    }

    #[test]
    fn rechunking_tool_use_stream_is_invariant() {
        // IDs are minted per stream, so compare shapes with ids erased.
        fn erase_ids(mut values: Vec<Value>) -> Vec<Value> {
            for value in &mut values {
                if let Some(id) = value.pointer_mut("/message/id") {
                    *id = Value::Null;
                }
                if let Some(id) = value.pointer_mut("/content_block/id") {
                    *id = Value::Null;
                }
            }
            values
        }

        let mut reference_state = AnthropicStreamState::default();
        let (reference, _) = AnthropicAdapter
            .parse_stream_chunk(TOOL_USE_STREAM, &mut reference_state)
            .unwrap();
        let reference = erase_ids(events_to_values(&reference));

        for split_at in 1..TOOL_USE_STREAM.len() {
            let mut state = AnthropicStreamState::default();

            let (head, rest) = AnthropicAdapter
                .parse_stream_chunk(&TOOL_USE_STREAM[..split_at], &mut state)
                .unwrap();

            let mut buffer = rest;
            buffer.push_str(&TOOL_USE_STREAM[split_at..]);
            let (tail, rest) = AnthropicAdapter.parse_stream_chunk(&buffer, &mut state).unwrap();

            let mut events = events_to_values(&head);
            events.extend(events_to_values(&tail));

            assert_eq!(erase_ids(events), reference, "mismatch when splitting at byte {split_at}");
            assert_eq!(rest, "");
        }
    }

    #[test]
    fn text_block_closes_before_tool_block_starts() {
        let stream = concat!(
            "data: {\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Checking\"}}]}\n\n",
            "data: {\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_9\",\"function\":{\"name\":\"lookup\",\"arguments\":\"{}\"}}]}}]}\n\n",
            "data: [DONE]\n\n",
        );

        let mut state = AnthropicStreamState::default();
        let (events, _) = AnthropicAdapter.parse_stream_chunk(stream, &mut state).unwrap();
        let values = events_to_values(&events);

        let types: Vec<&str> = values.iter().map(|v| v["type"].as_str().unwrap()).collect();
        assert_eq!(
            types,
            vec![
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );

        // Text block at index 0, tool block at index 1.
        assert_eq!(values[1]["content_block"]["type"], "text");
        assert_eq!(values[1]["index"], 0);
        assert_eq!(values[2]["delta"]["type"], "text");
        assert_eq!(values[3]["index"], 0);
        assert_eq!(values[4]["content_block"]["type"], "tool_use");
        assert_eq!(values[4]["content_block"]["id"], "call_9");
        assert_eq!(values[4]["index"], 1);
        assert_eq!(values[6]["index"], 1);
    }

    #[test]
    fn block_indices_are_sequential() {
        let stream = concat!(
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"a\"}}]}\n\n",
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"name\":\"f1\",\"arguments\":\"{}\"}}]}}]}\n\n",
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":1,\"function\":{\"name\":\"f2\",\"arguments\":\"{}\"}}]}}]}\n\n",
            "data: [DONE]\n\n",
        );

        let mut state = AnthropicStreamState::default();
        let (events, _) = AnthropicAdapter.parse_stream_chunk(stream, &mut state).unwrap();

        let mut starts = Vec::new();
        for event in &events {
            if let StreamEvent::ContentBlockStart { index, .. } = event {
                starts.push(*index);
            }
        }

        assert_eq!(starts, vec![0, 1, 2]);
    }

    #[test]
    fn cached_tokens_split_input_accounting() {
        let stream = concat!(
            "data: {\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"ok\"},\"finish_reason\":\"stop\"}],",
            "\"usage\":{\"prompt_tokens\":100,\"completion_tokens\":8,\"total_tokens\":108,",
            "\"prompt_tokens_details\":{\"cached_tokens\":80}}}\n\n",
            "data: [DONE]\n\n",
        );

        let mut state = AnthropicStreamState::default();
        let (events, _) = AnthropicAdapter.parse_stream_chunk(stream, &mut state).unwrap();
        let values = events_to_values(&events);

        let start = &values[0];
        assert_eq!(start["type"], "message_start");
        assert_eq!(start["message"]["usage"]["input_tokens"], 20);
        assert_eq!(start["message"]["usage"]["cache_read_input_tokens"], 80);
        assert_eq!(start["message"]["usage"]["output_tokens"], 0);

        let delta = values.iter().find(|v| v["type"] == "message_delta").unwrap();
        assert_eq!(delta["usage"]["input_tokens"], 20);
        assert_eq!(delta["usage"]["cache_read_input_tokens"], 80);
        assert_eq!(delta["usage"]["output_tokens"], 8);

        // input + cache_read always reconstructs the upstream prompt count.
        assert_eq!(
            delta["usage"]["input_tokens"].as_u64().unwrap() + delta["usage"]["cache_read_input_tokens"].as_u64().unwrap(),
            100
        );
    }

    #[test]
    fn finish_without_done_sentinel_closes_message_once() {
        let mut state = AnthropicStreamState::default();
        AnthropicAdapter
            .parse_stream_chunk(
                "data: {\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"hi\"}}]}\n\n",
                &mut state,
            )
            .unwrap();

        let drained = AnthropicAdapter.finish_stream(&mut state);
        let values = events_to_values(&drained);
        let types: Vec<&str> = values.iter().map(|v| v["type"].as_str().unwrap()).collect();

        assert_eq!(types, vec!["content_block_stop", "message_delta", "message_stop"]);
        assert!(AnthropicAdapter.finish_stream(&mut state).is_empty());
    }

    #[test]
    fn empty_stream_drain_emits_nothing() {
        let mut state = AnthropicStreamState::default();
        assert!(AnthropicAdapter.finish_stream(&mut state).is_empty());
    }

    #[test]
    fn arguments_before_any_tool_block_are_skipped() {
        let stream = concat!(
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"{}\"}}]}}]}\n\n",
            "data: [DONE]\n\n",
        );

        let mut state = AnthropicStreamState::default();
        let (events, _) = AnthropicAdapter.parse_stream_chunk(stream, &mut state).unwrap();
        let values = events_to_values(&events);

        // The orphan delta is tolerated: only the message frame events appear.
        let types: Vec<&str> = values.iter().map(|v| v["type"].as_str().unwrap()).collect();
        assert_eq!(types, vec!["message_start", "message_delta", "message_stop"]);
    }

    #[test]
    fn structured_system_prompt_collapses_into_system_message() {
        let request: MessagesRequest = serde_json::from_value(json!({
            "system": [
                {"type": "text", "text": "Rule one."},
                {"type": "text", "text": "Rule two."}
            ],
            "messages": [{"role": "user", "content": "hi"}]
        }))
        .unwrap();

        let converted = AnthropicAdapter.convert_request(request);
        let value = serde_json::to_value(&converted).unwrap();

        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][0]["content"], "Rule one.\nRule two.");
    }

    #[test]
    fn text_only_messages_do_not_detect_vision() {
        let request: MessagesRequest = serde_json::from_value(json!({
            "messages": [
                {"role": "user", "content": "describe a sunset"},
                {"role": "assistant", "content": [{"type": "text", "text": "warm colors"}]}
            ]
        }))
        .unwrap();

        assert!(!AnthropicAdapter.detect_vision(&request));
    }

    #[test]
    fn error_event_uses_anthropic_envelope() {
        let event = AnthropicAdapter.error_event(&GatewayError::UpstreamStatus {
            status: 503,
            message: "overloaded".to_string(),
        });

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["error"]["type"], "api_error");
        assert!(value["error"]["message"].as_str().unwrap().contains("503"));
    }

    #[test]
    fn unary_response_with_reasoning_tool_call() {
        let body = json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": "It is sunny.",
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "get_weather", "arguments": "{\"location\":\"Beijing\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {
                "prompt_tokens": 50,
                "completion_tokens": 12,
                "total_tokens": 62,
                "prompt_tokens_details": {"cached_tokens": 10}
            }
        })
        .to_string();

        let response = AnthropicAdapter.parse_response(&body).unwrap();

        assert_eq!(response.content.len(), 2);
        assert!(matches!(&response.content[0], ResponseBlock::Text { text } if text == "It is sunny."));

        let ResponseBlock::ToolUse { id, name, input } = &response.content[1] else {
            unreachable!("expected tool_use block");
        };
        assert_eq!(id, "call_1");
        assert_eq!(name, "get_weather");
        assert_eq!(input, &json!({"location": "Beijing"}));

        assert_eq!(response.stop_reason, Some(StopReason::ToolUse));
        assert_eq!(response.usage.input_tokens, 40);
        assert_eq!(response.usage.cache_read_input_tokens, 10);
        assert_eq!(response.usage.output_tokens, 12);
    }

    #[test]
    fn malformed_tool_arguments_wrap_raw_string() {
        let body = json!({
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "f", "arguments": "{broken"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        })
        .to_string();

        let response = AnthropicAdapter.parse_response(&body).unwrap();

        let ResponseBlock::ToolUse { input, .. } = &response.content[0] else {
            unreachable!("expected tool_use block");
        };
        assert_eq!(input, &json!({"arguments": "{broken"}));
    }
}
