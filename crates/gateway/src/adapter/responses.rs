//! Adapter for the OpenAI Responses protocol.
//!
//! Requests normalize the `input` item list, the instructions, the text
//! format and the tool definitions into the upstream chat shape. Responses
//! are rebuilt as typed `output[]` items, and streaming emits the
//! `response.*` life-cycle events (`output_item`, `content_part`,
//! `output_text`, `annotation`, `function_call_arguments`) reconstructed
//! from the flat upstream deltas.

use serde_json::{Map, Value, json};

use crate::{
    adapter::ProtocolAdapter,
    error::{GatewayError, GatewayResult},
    messages::{
        openai::{
            Annotation, ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ChatRole,
            ContentPart, FinishReason, FunctionCall, ImageUrl, MessageContent, ToolCall, ToolCallType, Usage,
        },
        responses::{
            IncompleteDetails, OutputAnnotation, OutputContent, OutputItem, Response, ResponseStatus,
            ResponsesInput, ResponsesRequest, ResponsesUsage, StreamEvent, SummaryPart,
        },
    },
    sse::{self, SsePayload},
};

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ResponsesAdapter;

/// Streaming state for one `/v1/responses` request.
#[derive(Debug, Default)]
pub(crate) struct ResponsesStreamState {
    initialized: bool,
    response_id: String,
    item_id: String,
    created_at: i64,
    model: String,
    output_text: String,
    usage: Option<Usage>,
    tool_calls: Vec<ToolCallAccumulator>,
    output_item_added: bool,
    content_part_added: bool,
    annotations: Vec<OutputAnnotation>,
    annotations_emitted: bool,
    finished: bool,
}

/// Reconstructs one function call from argument fragments.
///
/// `output_index` is the upstream tool index shifted by one when text was
/// already produced. It assumes at most one leading message block; with
/// reasoning items in the same stream the index may not match the unary
/// `output[]` ordering. Known limitation.
#[derive(Debug)]
struct ToolCallAccumulator {
    index: u32,
    output_index: u32,
    item_id: String,
    call_id: String,
    name: String,
    arguments: String,
}

impl ProtocolAdapter for ResponsesAdapter {
    type Request = ResponsesRequest;
    type UnaryResponse = Response;
    type Event = StreamEvent;
    type State = ResponsesStreamState;

    fn wants_stream(&self, request: &Self::Request) -> bool {
        request.stream.unwrap_or(false)
    }

    fn convert_request(&self, request: Self::Request) -> ChatCompletionRequest {
        let mut messages = Vec::new();

        if let Some(instructions) = request.instructions {
            messages.push(ChatMessage::text(ChatRole::System, instructions));
        }

        match request.input {
            Some(ResponsesInput::Text(text)) => messages.push(ChatMessage::text(ChatRole::User, text)),
            Some(ResponsesInput::Items(items)) => {
                for item in items {
                    convert_input_item(item, &mut messages);
                }
            }
            None => {}
        }

        let mut extra = Map::new();

        if let Some(effort) = request.reasoning.and_then(|r| r.effort) {
            extra.insert("reasoning_effort".to_string(), Value::String(effort));
        }

        if let Some(format) = request.text.and_then(|t| t.format)
            && let Some(response_format) = convert_text_format(&format)
        {
            extra.insert("response_format".to_string(), response_format);
        }

        if let Some(temperature) = request.temperature {
            extra.insert("temperature".to_string(), Value::from(temperature));
        }
        if let Some(top_p) = request.top_p {
            extra.insert("top_p".to_string(), Value::from(top_p));
        }
        if let Some(max_output_tokens) = request.max_output_tokens {
            extra.insert("max_tokens".to_string(), Value::from(max_output_tokens));
        }
        if let Some(metadata) = request.metadata {
            extra.insert("metadata".to_string(), metadata);
        }
        if let Some(user) = request.user {
            extra.insert("user".to_string(), user);
        }
        if let Some(truncation) = request.truncation {
            extra.insert("truncation".to_string(), truncation);
        }

        let tools = request.tools.map(|tools| convert_tools(tools, &mut extra));
        let tool_choice = request.tool_choice.and_then(convert_tool_choice);

        ChatCompletionRequest {
            model: request.model,
            messages,
            stream: None,
            tools,
            tool_choice,
            extra,
        }
    }

    fn detect_vision(&self, request: &Self::Request) -> bool {
        let Some(ResponsesInput::Items(items)) = &request.input else {
            return false;
        };

        items.iter().any(|item| {
            let Some(parts) = item.get("content").and_then(Value::as_array) else {
                return false;
            };

            parts
                .iter()
                .any(|part| part.get("type").and_then(Value::as_str) == Some("input_image"))
        })
    }

    fn parse_response(&self, body: &str) -> GatewayResult<Self::UnaryResponse> {
        let response: ChatCompletionResponse = sonic_rs::from_str(body)
            .map_err(|e| GatewayError::StreamParse(format!("invalid upstream response: {e}")))?;

        let mut output = Vec::new();

        // Reasoning items come first, one per choice that produced any.
        for choice in &response.choices {
            if let Some(reasoning) = &choice.message.reasoning_content
                && !reasoning.is_empty()
            {
                output.push(OutputItem::Reasoning {
                    id: mint_id("reasoning"),
                    summary: vec![SummaryPart::text(reasoning.clone())],
                });
            }
        }

        let text: String = response
            .choices
            .iter()
            .filter_map(|choice| choice.message.content.as_deref())
            .collect();

        let annotations: Vec<OutputAnnotation> = response
            .choices
            .iter()
            .flat_map(|choice| choice.message.annotations.iter().flatten())
            .filter_map(convert_annotation)
            .collect();

        let finish_reason = response.choices.iter().find_map(|choice| choice.finish_reason.clone());
        let (status, incomplete_details) = map_status(finish_reason.as_ref());
        let status_label = status_label(status);

        if !text.is_empty() {
            output.push(OutputItem::Message {
                id: mint_id("msg"),
                status: status_label.to_string(),
                role: "assistant".to_string(),
                content: vec![OutputContent::OutputText {
                    text: text.clone(),
                    annotations,
                }],
            });
        }

        for call in response
            .choices
            .iter()
            .flat_map(|choice| choice.message.tool_calls.iter().flatten())
        {
            output.push(OutputItem::FunctionCall {
                id: mint_id("fc"),
                call_id: call.id.clone(),
                name: call.function.name.clone(),
                arguments: call.function.arguments.clone(),
                status: "completed".to_string(),
            });
        }

        Ok(Response {
            id: mint_id("resp"),
            object: "response".to_string(),
            created_at: response.created.unwrap_or(0),
            status,
            model: response.model.unwrap_or_default(),
            output,
            output_text: text,
            incomplete_details,
            usage: response.usage.map(convert_usage),
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
        StreamEvent::Error {
            message: error.client_message(),
        }
    }
}

impl ResponsesStreamState {
    fn process_chunk(&mut self, chunk: ChatCompletionChunk, events: &mut Vec<StreamEvent>) {
        if !self.initialized {
            self.initialized = true;
            self.response_id = mint_id("resp");
            self.item_id = mint_id("msg");
            self.created_at = chunk.created.unwrap_or(0);
            self.model = chunk.model.clone().unwrap_or_default();

            events.push(StreamEvent::Created {
                response: self.envelope(ResponseStatus::InProgress),
            });
            events.push(StreamEvent::InProgress {
                response: self.envelope(ResponseStatus::InProgress),
            });
        }

        if chunk.usage.is_some() {
            self.usage = chunk.usage;
        }

        let Some(choice) = chunk.choices.into_iter().next() else {
            return;
        };

        let delta = choice.delta;
        let has_content = delta.content.as_deref().is_some_and(|c| !c.is_empty());
        let has_tool_calls = delta.tool_calls.as_ref().is_some_and(|calls| !calls.is_empty());

        if (has_content || has_tool_calls) && !self.output_item_added {
            self.output_item_added = true;

            events.push(StreamEvent::OutputItemAdded {
                output_index: 0,
                item: OutputItem::Message {
                    id: self.item_id.clone(),
                    status: "in_progress".to_string(),
                    role: "assistant".to_string(),
                    content: vec![],
                },
            });
        }

        if let Some(content) = delta.content
            && !content.is_empty()
        {
            if !self.content_part_added {
                self.content_part_added = true;

                events.push(StreamEvent::ContentPartAdded {
                    item_id: self.item_id.clone(),
                    output_index: 0,
                    content_index: 0,
                    part: OutputContent::OutputText {
                        text: String::new(),
                        annotations: vec![],
                    },
                });
            }

            self.output_text.push_str(&content);

            events.push(StreamEvent::OutputTextDelta {
                item_id: self.item_id.clone(),
                output_index: 0,
                content_index: 0,
                delta: content,
            });
        }

        if let Some(annotations) = delta.annotations
            && !self.annotations_emitted
        {
            self.annotations_emitted = true;

            for annotation in annotations.iter().filter_map(convert_annotation) {
                let annotation_index = u32::try_from(self.annotations.len()).unwrap_or(0);
                self.annotations.push(annotation.clone());

                events.push(StreamEvent::AnnotationAdded {
                    item_id: self.item_id.clone(),
                    output_index: 0,
                    content_index: 0,
                    annotation_index,
                    annotation,
                });
            }
        }

        for tool_delta in delta.tool_calls.into_iter().flatten() {
            let index = tool_delta.index.unwrap_or(0);

            let position = match self.tool_calls.iter().position(|acc| acc.index == index) {
                Some(position) => position,
                None => {
                    let output_index = index + u32::from(!self.output_text.is_empty());
                    let item_id = tool_delta.id.clone().unwrap_or_else(|| mint_id("fc"));

                    self.tool_calls.push(ToolCallAccumulator {
                        index,
                        output_index,
                        call_id: tool_delta.id.clone().unwrap_or_else(|| item_id.clone()),
                        item_id,
                        name: String::new(),
                        arguments: String::new(),
                    });

                    self.tool_calls.len() - 1
                }
            };

            let accumulator = &mut self.tool_calls[position];
            let function = tool_delta.function.unwrap_or_default();

            if let Some(name) = function.name
                && accumulator.name.is_empty()
            {
                accumulator.name = name;
            }

            if let Some(arguments) = function.arguments
                && !arguments.is_empty()
            {
                accumulator.arguments.push_str(&arguments);

                events.push(StreamEvent::FunctionCallArgumentsDelta {
                    item_id: accumulator.item_id.clone(),
                    output_index: accumulator.output_index,
                    delta: arguments,
                });
            }
        }
    }

    /// Emits the closing events and the final `response.completed`
    /// envelope. Idempotent, and a no-op for streams that never produced
    /// a frame.
    fn finalize(&mut self) -> Vec<StreamEvent> {
        if self.finished || !self.initialized {
            self.finished = true;
            return Vec::new();
        }
        self.finished = true;

        let mut events = Vec::new();

        if self.content_part_added {
            events.push(StreamEvent::ContentPartDone {
                item_id: self.item_id.clone(),
                output_index: 0,
                content_index: 0,
                part: OutputContent::OutputText {
                    text: self.output_text.clone(),
                    annotations: self.annotations.clone(),
                },
            });
        }

        if self.output_item_added {
            events.push(StreamEvent::OutputItemDone {
                output_index: 0,
                item: self.message_item("completed"),
            });
        }

        if !self.output_text.is_empty() {
            events.push(StreamEvent::OutputTextDone {
                item_id: self.item_id.clone(),
                output_index: 0,
                content_index: 0,
                text: self.output_text.clone(),
            });
        }

        for accumulator in &self.tool_calls {
            events.push(StreamEvent::FunctionCallArgumentsDone {
                item_id: accumulator.item_id.clone(),
                output_index: accumulator.output_index,
                arguments: accumulator.arguments.clone(),
            });
        }

        events.push(StreamEvent::Completed {
            response: self.envelope(ResponseStatus::Completed),
        });

        events
    }

    fn message_item(&self, status: &str) -> OutputItem {
        OutputItem::Message {
            id: self.item_id.clone(),
            status: status.to_string(),
            role: "assistant".to_string(),
            content: vec![OutputContent::OutputText {
                text: self.output_text.clone(),
                annotations: self.annotations.clone(),
            }],
        }
    }

    fn envelope(&self, status: ResponseStatus) -> Response {
        let mut output = Vec::new();

        if status == ResponseStatus::Completed {
            if self.output_item_added {
                output.push(self.message_item("completed"));
            }

            for accumulator in &self.tool_calls {
                output.push(OutputItem::FunctionCall {
                    id: accumulator.item_id.clone(),
                    call_id: accumulator.call_id.clone(),
                    name: accumulator.name.clone(),
                    arguments: accumulator.arguments.clone(),
                    status: "completed".to_string(),
                });
            }
        }

        Response {
            id: self.response_id.clone(),
            object: "response".to_string(),
            created_at: self.created_at,
            status,
            model: self.model.clone(),
            output,
            output_text: self.output_text.clone(),
            incomplete_details: None,
            usage: self.usage.map(convert_usage),
        }
    }
}

fn convert_input_item(item: Value, messages: &mut Vec<ChatMessage>) {
    let item_type = item.get("type").and_then(Value::as_str).unwrap_or("message");

    match item_type {
        "message" => {
            let role = match item.get("role").and_then(Value::as_str) {
                Some("system") => ChatRole::System,
                Some("assistant") => ChatRole::Assistant,
                Some("tool") => ChatRole::Tool,
                _ => ChatRole::User,
            };

            let content = normalize_content(item.get("content").cloned().unwrap_or(Value::Null));

            messages.push(ChatMessage {
                role,
                content: Some(content),
                tool_calls: None,
                tool_call_id: None,
                name: None,
                extra: Map::new(),
            });
        }
        "function_call_output" => {
            let call_id = item
                .get("call_id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();

            let output = match item.get("output") {
                Some(Value::String(text)) => text.clone(),
                Some(value) => serde_json::to_string(value).unwrap_or_default(),
                None => String::new(),
            };

            messages.push(ChatMessage {
                role: ChatRole::Tool,
                content: Some(MessageContent::Text(output)),
                tool_calls: None,
                tool_call_id: Some(call_id),
                name: None,
                extra: Map::new(),
            });
        }
        // Echo of a prior call in the conversation history.
        "function_call" => {
            let call_id = item
                .get("call_id")
                .or_else(|| item.get("id"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| mint_id("call"));

            let name = item.get("name").and_then(Value::as_str).unwrap_or_default().to_string();

            let arguments = match item.get("arguments") {
                Some(Value::String(text)) => text.clone(),
                Some(value) => serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string()),
                None => "{}".to_string(),
            };

            messages.push(ChatMessage {
                role: ChatRole::Assistant,
                content: None,
                tool_calls: Some(vec![ToolCall {
                    id: call_id,
                    call_type: ToolCallType::Function,
                    function: FunctionCall { name, arguments },
                }]),
                tool_call_id: None,
                name: None,
                extra: Map::new(),
            });
        }
        _ => {}
    }
}

fn normalize_content(content: Value) -> MessageContent {
    let parts = match content {
        Value::String(text) => return MessageContent::Text(text),
        Value::Array(parts) => parts,
        _ => return MessageContent::Text(String::new()),
    };

    let mut converted = Vec::with_capacity(parts.len());

    for part in parts {
        let part_type = part.get("type").and_then(Value::as_str).unwrap_or_default();

        match part_type {
            "input_text" | "output_text" | "tool_result" => {
                let text = part.get("text").and_then(Value::as_str).unwrap_or_default().to_string();
                converted.push(ContentPart::Text { text });
            }
            "input_image" => {
                let url = part
                    .get("image_url")
                    .or_else(|| part.get("url"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();

                converted.push(ContentPart::ImageUrl {
                    image_url: ImageUrl { url, detail: None },
                });
            }
            "input_file" => {
                let file = if let Some(file_id) = part.get("file_id") {
                    json!({ "file_id": file_id })
                } else if let Some(file_data) = part.get("file_data") {
                    json!({ "file_data": file_data })
                } else {
                    part.get("file").cloned().unwrap_or(Value::Null)
                };

                converted.push(ContentPart::File { file });
            }
            "input_audio" => {
                let input_audio = part
                    .get("input_audio")
                    .or_else(|| part.get("audio"))
                    .cloned()
                    .unwrap_or_else(|| json!({ "url": part.get("url").cloned().unwrap_or(Value::Null) }));

                converted.push(ContentPart::InputAudio { input_audio });
            }
            _ => converted.push(ContentPart::Other(part)),
        }
    }

    // A single text part collapses to the plain string form.
    if converted.len() == 1
        && let ContentPart::Text { text } = &converted[0]
    {
        return MessageContent::Text(text.clone());
    }

    MessageContent::Parts(converted)
}

fn convert_text_format(format: &Value) -> Option<Value> {
    match format.get("type").and_then(Value::as_str) {
        Some("json_schema") => {
            let mut json_schema = Map::new();

            for key in ["name", "schema", "strict"] {
                if let Some(value) = format.get(key) {
                    json_schema.insert(key.to_string(), value.clone());
                }
            }

            Some(json!({ "type": "json_schema", "json_schema": json_schema }))
        }
        Some("json_object") => Some(json!({ "type": "json_object" })),
        _ => None,
    }
}

fn convert_tool_choice(tool_choice: Value) -> Option<Value> {
    match &tool_choice {
        Value::String(_) => Some(tool_choice),
        Value::Object(object) => match object.get("type").and_then(Value::as_str) {
            Some("auto") => Some(Value::String("auto".to_string())),
            Some("none") => Some(Value::String("none".to_string())),
            Some("required") | Some("tool") => Some(Value::String("required".to_string())),
            _ => Some(tool_choice),
        },
        _ => None,
    }
}

fn convert_tools(tools: Vec<Value>, extra: &mut Map<String, Value>) -> Vec<Value> {
    let mut converted = Vec::with_capacity(tools.len());
    let mut web_search_options = Map::new();

    for tool in tools {
        match tool.get("type").and_then(Value::as_str) {
            Some("mcp") => converted.push(tool),
            // Web search entries move out of tools into a side-car option.
            Some("web_search") | Some("web_search_preview") => {
                for key in ["search_context_size", "user_location"] {
                    if let Some(value) = tool.get(key) {
                        web_search_options.insert(key.to_string(), value.clone());
                    }
                }

                // An option-less entry still enables web search upstream.
                extra.insert("web_search_options".to_string(), Value::Object(web_search_options.clone()));
            }
            _ => converted.push(normalize_function_tool(tool)),
        }
    }

    converted
}

fn normalize_function_tool(tool: Value) -> Value {
    let Value::Object(map) = tool else {
        return tool;
    };

    let mut function = match map.get("function") {
        Some(Value::Object(function)) => function.clone(),
        _ => {
            let mut function = Map::new();

            for key in ["name", "description", "parameters", "strict"] {
                if let Some(value) = map.get(key) {
                    function.insert(key.to_string(), value.clone());
                }
            }

            function
        }
    };

    match function.get_mut("parameters") {
        Some(Value::Object(parameters)) => {
            parameters
                .entry("type".to_string())
                .or_insert_with(|| Value::String("object".to_string()));
        }
        None => {
            function.insert("parameters".to_string(), json!({ "type": "object" }));
        }
        Some(_) => {}
    }

    let mut entry = Map::new();
    entry.insert("type".to_string(), Value::String("function".to_string()));
    entry.insert("function".to_string(), Value::Object(function));

    for key in ["cache_control", "defer_loading", "allowed_callers", "input_examples"] {
        if let Some(value) = map.get(key) {
            entry.insert(key.to_string(), value.clone());
        }
    }

    Value::Object(entry)
}

fn convert_annotation(annotation: &Annotation) -> Option<OutputAnnotation> {
    let annotation_type = annotation.annotation_type.as_deref().unwrap_or("url_citation");

    if annotation_type != "url_citation" {
        return None;
    }

    let citation = annotation.url_citation.as_ref()?;

    Some(OutputAnnotation {
        r#type: "url_citation".to_string(),
        start_index: citation.start_index,
        end_index: citation.end_index,
        url: citation.url.clone(),
        title: citation.title.clone(),
    })
}

fn map_status(finish_reason: Option<&FinishReason>) -> (ResponseStatus, Option<IncompleteDetails>) {
    match finish_reason {
        Some(FinishReason::Length) => (
            ResponseStatus::Incomplete,
            Some(IncompleteDetails {
                reason: "max_tokens".to_string(),
            }),
        ),
        Some(FinishReason::ContentFilter) => (
            ResponseStatus::Incomplete,
            Some(IncompleteDetails {
                reason: "content_filter".to_string(),
            }),
        ),
        _ => (ResponseStatus::Completed, None),
    }
}

fn status_label(status: ResponseStatus) -> &'static str {
    match status {
        ResponseStatus::InProgress => "in_progress",
        ResponseStatus::Completed => "completed",
        ResponseStatus::Incomplete => "incomplete",
    }
}

fn convert_usage(usage: Usage) -> ResponsesUsage {
    let reasoning_tokens = usage
        .completion_tokens_details
        .map(|details| details.reasoning_tokens)
        .unwrap_or(0);

    ResponsesUsage {
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
        total_tokens: usage.total_tokens,
        input_tokens_details: crate::messages::responses::InputTokensDetails {
            cached_tokens: usage.cached_tokens(),
            text_tokens: usage.prompt_tokens,
            audio_tokens: 0,
        },
        output_tokens_details: crate::messages::responses::OutputTokensDetails {
            reasoning_tokens,
            text_tokens: usage.completion_tokens.saturating_sub(reasoning_tokens),
        },
        cost: usage.cost,
    }
}

fn mint_id(prefix: &str) -> String {
    format!("{prefix}_{}", uuid::Uuid::new_v4().simple())
}
