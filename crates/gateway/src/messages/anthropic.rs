//! Wire types for the Anthropic Messages protocol.
//!
//! The format differs from the upstream OpenAI format in several key ways:
//! messages carry arrays of typed content blocks, the system prompt lives
//! outside the messages array, tool use is expressed as `tool_use` /
//! `tool_result` blocks, and streaming uses a stateful event vocabulary
//! (`message_start`, `content_block_*`, `message_delta`, `message_stop`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request body for `POST /v1/messages`.
#[derive(Debug, Clone, Deserialize)]
pub struct MessagesRequest {
    #[serde(default)]
    pub model: String,

    #[serde(default)]
    pub messages: Vec<InputMessage>,

    /// System prompt, inserted as the first upstream message.
    #[serde(default)]
    pub system: Option<SystemPrompt>,

    #[serde(default)]
    pub max_tokens: Option<u32>,

    #[serde(default)]
    pub temperature: Option<f64>,

    #[serde(default)]
    pub top_p: Option<f64>,

    #[serde(default)]
    pub top_k: Option<u32>,

    /// Absence means a unary response.
    #[serde(default)]
    pub stream: Option<bool>,

    #[serde(default)]
    pub tools: Option<Vec<ToolDefinition>>,
}

/// System prompt: a plain string, or a list of text blocks from newer
/// clients.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SystemPrompt {
    Text(String),
    Blocks(Vec<SystemBlock>),
}

impl SystemPrompt {
    /// Collapses the prompt into a single string.
    pub fn into_text(self) -> String {
        match self {
            SystemPrompt::Text(text) => text,
            SystemPrompt::Blocks(blocks) => blocks
                .into_iter()
                .map(|block| block.text)
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// One block of a structured system prompt.
#[derive(Debug, Clone, Deserialize)]
pub struct SystemBlock {
    #[serde(default)]
    pub text: String,
}

/// An inbound message with role and content.
#[derive(Debug, Clone, Deserialize)]
pub struct InputMessage {
    pub role: Role,
    pub content: InputContent,
}

/// Role of a message author. Anthropic only defines user and assistant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Message content: a shortcut string or an array of content blocks.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum InputContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// Content block in an inbound message.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "image")]
    Image { source: ImageSource },

    /// Tool use request recorded on a prior assistant turn.
    #[serde(rename = "tool_use")]
    ToolUse { id: String, name: String, input: Value },

    /// Result of a tool execution, sent back by the client.
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Value,
    },

    /// Unknown block types are dropped during conversion.
    #[serde(untagged)]
    Other(Value),
}

/// Image source for image content blocks.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageSource {
    /// The media type of the image, e.g. `image/png`.
    #[serde(default)]
    pub media_type: Option<String>,

    /// Base64-encoded image data.
    #[serde(default)]
    pub data: String,
}

/// Tool definition in Anthropic format.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolDefinition {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// JSON Schema for the tool's input parameters.
    #[serde(default)]
    pub input_schema: Option<Value>,
}

/// Response body for a unary `POST /v1/messages`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesResponse {
    pub id: String,

    /// Always "message".
    pub r#type: String,

    /// Always "assistant".
    pub role: String,

    pub content: Vec<ResponseBlock>,

    pub model: String,

    pub stop_reason: Option<StopReason>,

    pub stop_sequence: Option<String>,

    pub usage: Usage,
}

/// A content block in a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ResponseBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "tool_use")]
    ToolUse { id: String, name: String, input: Value },
}

/// The reason why the model stopped generating tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model reached a natural stopping point.
    EndTurn,
    /// The generation exceeded the requested token limit.
    MaxTokens,
    /// The model invoked a tool.
    ToolUse,
    /// The model declined to produce content.
    Refusal,
}

/// Token usage in Anthropic format.
///
/// `input_tokens` counts only prompt tokens that were not served from
/// cache; cached tokens are reported separately so that
/// `input_tokens + cache_read_input_tokens` equals the upstream prompt
/// token count.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,

    pub output_tokens: u32,

    pub cache_read_input_tokens: u32,

    pub cache_creation_input_tokens: u32,
}

/// Streaming event for `POST /v1/messages` with `stream: true`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    /// Start of a message; content is always empty at this stage.
    #[serde(rename = "message_start")]
    MessageStart { message: MessageStart },

    /// Beginning of a content block at the given index.
    #[serde(rename = "content_block_start")]
    ContentBlockStart { index: u32, content_block: StartBlock },

    /// Incremental update to the block at the given index.
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { index: u32, delta: BlockDelta },

    /// No more deltas will arrive for the block at the given index.
    #[serde(rename = "content_block_stop")]
    ContentBlockStop { index: u32 },

    /// Final message metadata: stop reason and usage.
    #[serde(rename = "message_delta")]
    MessageDelta { delta: MessageDeltaData, usage: Usage },

    /// End of the stream.
    #[serde(rename = "message_stop")]
    MessageStop,

    /// Error event; the stream closes after this.
    #[serde(rename = "error")]
    Error { error: ErrorDetails },
}

/// Initial message metadata in a `message_start` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageStart {
    pub id: String,

    /// Always "message".
    pub r#type: String,

    /// Always "assistant".
    pub role: String,

    /// Always empty; content arrives through block events.
    pub content: Vec<ResponseBlock>,

    pub model: String,

    /// Always null here; set in `message_delta`.
    pub stop_reason: Option<StopReason>,

    pub stop_sequence: Option<String>,

    pub usage: Usage,
}

/// Content block metadata in a `content_block_start` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StartBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "tool_use")]
    ToolUse { id: String, name: String, input: Value },
}

/// Delta payload in a `content_block_delta` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BlockDelta {
    #[serde(rename = "text")]
    TextDelta { text: String },

    #[serde(rename = "input_json_delta")]
    InputJsonDelta { partial_json: String },
}

/// Delta payload in a `message_delta` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDeltaData {
    pub stop_reason: Option<StopReason>,

    pub stop_sequence: Option<String>,
}

/// Error envelope shared by unary error responses and stream error events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Always "error".
    pub r#type: String,

    pub error: ErrorDetails,
}

/// Error details in Anthropic format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub r#type: String,

    pub message: String,
}
