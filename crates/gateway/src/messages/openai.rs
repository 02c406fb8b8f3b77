//! Wire types for the upstream OpenAI Chat Completions protocol.
//!
//! This is the interchange format of the relay: every inbound protocol is
//! converted into [`ChatCompletionRequest`], and every outbound protocol is
//! reconstructed from [`ChatCompletionResponse`] or the streaming
//! [`ChatCompletionChunk`] deltas. Unrecognized request fields are preserved
//! through flattened maps so extension keys survive the round trip.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Request body for the upstream Chat Completions endpoint.
///
/// An instance is fully self-contained: once built by an adapter it can be
/// serialized and sent without further access to the inbound request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    /// The model to use for the completion.
    ///
    /// Adapters may leave this empty; the pipeline fills in the default
    /// model before the upstream call.
    #[serde(default)]
    pub model: String,

    /// The conversation messages.
    #[serde(default)]
    pub messages: Vec<ChatMessage>,

    /// Whether to stream the response. Always set by the pipeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,

    /// Tool definitions available to the model.
    ///
    /// Entries are kept as raw JSON: the Ollama protocol copies them
    /// unchanged, and the Responses protocol mixes function tools with
    /// passthrough entries such as MCP servers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,

    /// Controls how the model uses tools.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,

    /// Any other request parameters (`temperature`, `max_tokens`,
    /// `response_format`, spread Ollama `options`, …) pass through here.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A single message in an upstream request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The role of the message author.
    pub role: ChatRole,

    /// Message content; either a plain string or an ordered list of parts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<MessageContent>,

    /// Tool calls made by the assistant in this message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,

    /// For tool result messages, the id of the call being answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Optional participant name, preserved for tool and function roles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Unrecognized message fields pass through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatMessage {
    /// A message whose content is a plain string.
    pub fn text(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(MessageContent::Text(content.into())),
            tool_calls: None,
            tool_call_id: None,
            name: None,
            extra: Map::new(),
        }
    }
}

/// Role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
    /// Legacy function-calling role, still seen from older clients.
    Function,
}

/// Message content: a plain string or structured parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// One structured content part.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },

    #[serde(rename = "file")]
    File { file: Value },

    #[serde(rename = "input_audio")]
    InputAudio { input_audio: Value },

    /// Unknown part types pass through untouched.
    #[serde(untagged)]
    Other(Value),
}

/// An image reference inside a content part.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    /// HTTP(S) URL or `data:` URL carrying the image.
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// A complete tool call on an assistant message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier for this call.
    pub id: String,

    /// Always "function".
    #[serde(rename = "type", default)]
    pub call_type: ToolCallType,

    pub function: FunctionCall,
}

/// Discriminator for tool call entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallType {
    #[default]
    Function,
}

/// The function invocation inside a tool call.
///
/// `arguments` is always a JSON-encoded string in upstream requests, never
/// an object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

/// Unary response from the upstream Chat Completions endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub model: Option<String>,

    /// Unix timestamp in seconds.
    #[serde(default)]
    pub created: Option<i64>,

    #[serde(default)]
    pub choices: Vec<ChatChoice>,

    #[serde(default)]
    pub usage: Option<Usage>,
}

/// One completion choice in a unary response.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    #[serde(default)]
    pub index: u32,

    pub message: AssistantMessage,

    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
}

/// The assistant message inside a unary choice.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: Option<String>,

    /// Model reasoning, emitted by reasoning-capable models.
    #[serde(default)]
    pub reasoning_content: Option<String>,

    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCall>>,

    /// Web-search style annotations attached to the message.
    #[serde(default)]
    pub annotations: Option<Vec<Annotation>>,
}

/// The reason the model stopped generating tokens.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub enum FinishReason {
    #[serde(rename = "stop")]
    Stop,
    #[serde(rename = "length")]
    Length,
    #[serde(rename = "tool_calls")]
    ToolCalls,
    #[serde(rename = "function_call")]
    FunctionCall,
    #[serde(rename = "content_filter")]
    ContentFilter,
    /// Any other finish reason not yet known.
    /// Captures the actual string value for forward compatibility.
    #[serde(untagged)]
    Other(String),
}

/// An annotation on assistant output, as produced by web search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(rename = "type", default)]
    pub annotation_type: Option<String>,

    #[serde(default)]
    pub url_citation: Option<UrlCitation>,

    /// Unrecognized annotation fields pass through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A URL citation inside an annotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlCitation {
    #[serde(default)]
    pub start_index: u32,

    #[serde(default)]
    pub end_index: u32,

    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub title: Option<String>,
}

/// Token usage reported by the upstream.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,

    #[serde(default)]
    pub completion_tokens: u32,

    #[serde(default)]
    pub total_tokens: u32,

    #[serde(default)]
    pub prompt_tokens_details: Option<PromptTokensDetails>,

    #[serde(default)]
    pub completion_tokens_details: Option<CompletionTokensDetails>,

    /// Billing cost, forwarded when the upstream reports one.
    #[serde(default)]
    pub cost: Option<f64>,
}

impl Usage {
    /// Tokens served from the prompt cache.
    pub fn cached_tokens(&self) -> u32 {
        self.prompt_tokens_details.map(|d| d.cached_tokens).unwrap_or(0)
    }

    /// Prompt tokens that were not served from cache.
    pub fn billable_prompt_tokens(&self) -> u32 {
        self.prompt_tokens.saturating_sub(self.cached_tokens())
    }
}

/// Prompt token detail counters.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PromptTokensDetails {
    #[serde(default)]
    pub cached_tokens: u32,
}

/// Completion token detail counters.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct CompletionTokensDetails {
    #[serde(default)]
    pub reasoning_tokens: u32,
}

/// One decoded SSE frame from the upstream stream.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub model: Option<String>,

    /// Unix timestamp in seconds.
    #[serde(default)]
    pub created: Option<i64>,

    #[serde(default)]
    pub choices: Vec<StreamChoice>,

    /// Usually present only on the final frame before `[DONE]`.
    #[serde(default)]
    pub usage: Option<Usage>,
}

/// One choice delta inside a stream chunk.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamChoice {
    #[serde(default)]
    pub index: u32,

    #[serde(default)]
    pub delta: MessageDelta,

    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
}

/// Incremental message content inside a stream choice.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageDelta {
    #[serde(default)]
    pub role: Option<ChatRole>,

    #[serde(default)]
    pub content: Option<String>,

    #[serde(default)]
    pub reasoning_content: Option<String>,

    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCallDelta>>,

    #[serde(default)]
    pub annotations: Option<Vec<Annotation>>,
}

/// A fragment of a tool call arriving in a stream delta.
///
/// The first fragment of a call carries `id` and `function.name`; later
/// fragments append to `function.arguments`.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallDelta {
    #[serde(default)]
    pub index: Option<u32>,

    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub function: Option<FunctionDelta>,
}

/// The function fragment inside a tool call delta.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FunctionDelta {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_preserves_unknown_fields() {
        let payload = json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "hi", "custom_hint": true}],
            "temperature": 0.5,
            "logit_bias": {"50256": -100}
        });

        let request: ChatCompletionRequest = serde_json::from_value(payload.clone()).unwrap();
        let roundtripped = serde_json::to_value(&request).unwrap();

        assert_eq!(roundtripped, payload);
    }

    #[test]
    fn content_parts_roundtrip() {
        let payload = json!([
            {"type": "text", "text": "what?"},
            {"type": "image_url", "image_url": {"url": "data:image/png;base64,iVBOR"}},
            {"type": "mystery", "payload": 42}
        ]);

        let parts: Vec<ContentPart> = serde_json::from_value(payload.clone()).unwrap();

        assert!(matches!(parts[0], ContentPart::Text { .. }));
        assert!(matches!(parts[1], ContentPart::ImageUrl { .. }));
        assert!(matches!(parts[2], ContentPart::Other(_)));

        assert_eq!(serde_json::to_value(&parts).unwrap(), payload);
    }

    #[test]
    fn chunk_with_tool_call_delta_decodes() {
        let chunk: ChatCompletionChunk = serde_json::from_str(
            r#"{"id":"c1","model":"gpt-4o","created":1700000000,"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"id":"call_9","function":{"name":"get_weather","arguments":""}}]},"finish_reason":null}]}"#,
        )
        .unwrap();

        let delta = &chunk.choices[0].delta;
        let tool_calls = delta.tool_calls.as_ref().unwrap();
        assert_eq!(tool_calls[0].id.as_deref(), Some("call_9"));
        assert_eq!(
            tool_calls[0].function.as_ref().unwrap().name.as_deref(),
            Some("get_weather")
        );
    }

    #[test]
    fn assistant_tool_call_message_roundtrips_without_content() {
        let payload = json!({
            "role": "assistant",
            "tool_calls": [{
                "id": "call_1",
                "type": "function",
                "function": {"name": "get_weather", "arguments": "{\"location\":\"Beijing\"}"}
            }]
        });

        let message: ChatMessage = serde_json::from_value(payload.clone()).unwrap();

        assert!(message.content.is_none());
        assert_eq!(serde_json::to_value(&message).unwrap(), payload);
    }

    #[test]
    fn unknown_finish_reason_is_captured() {
        let reason: FinishReason = serde_json::from_value(json!("special")).unwrap();
        assert_eq!(reason, FinishReason::Other("special".to_string()));
    }

    #[test]
    fn usage_cached_token_arithmetic() {
        let usage: Usage = serde_json::from_value(json!({
            "prompt_tokens": 100,
            "completion_tokens": 8,
            "total_tokens": 108,
            "prompt_tokens_details": {"cached_tokens": 80}
        }))
        .unwrap();

        assert_eq!(usage.cached_tokens(), 80);
        assert_eq!(usage.billable_prompt_tokens(), 20);
    }
}
