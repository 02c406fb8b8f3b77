//! Wire types for the OpenAI Responses protocol.
//!
//! The Responses API wraps model output in typed `output[]` items
//! (`reasoning`, `message`, `function_call`) and streams a rich
//! `response.*` event vocabulary with explicit life-cycles for output
//! items, content parts, text deltas and annotations.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request body for `POST /v1/responses`.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponsesRequest {
    #[serde(default)]
    pub model: String,

    /// Conversation input: a bare string or a list of typed items.
    #[serde(default)]
    pub input: Option<ResponsesInput>,

    /// Prepended as a system message.
    #[serde(default)]
    pub instructions: Option<String>,

    #[serde(default)]
    pub reasoning: Option<ReasoningConfig>,

    #[serde(default)]
    pub text: Option<TextConfig>,

    /// Tool definitions; raw JSON because function tools, MCP servers and
    /// web-search entries all mix in the same list.
    #[serde(default)]
    pub tools: Option<Vec<Value>>,

    #[serde(default)]
    pub tool_choice: Option<Value>,

    #[serde(default)]
    pub temperature: Option<f64>,

    #[serde(default)]
    pub top_p: Option<f64>,

    #[serde(default)]
    pub max_output_tokens: Option<u32>,

    #[serde(default)]
    pub stream: Option<bool>,

    /// Passed through to the upstream payload unchanged.
    #[serde(default)]
    pub metadata: Option<Value>,

    /// Passed through to the upstream payload unchanged.
    #[serde(default)]
    pub user: Option<Value>,

    /// Passed through to the upstream payload unchanged.
    #[serde(default)]
    pub truncation: Option<Value>,
}

/// The `input` field: a user message shortcut or structured items.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ResponsesInput {
    Text(String),
    Items(Vec<Value>),
}

/// Reasoning configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ReasoningConfig {
    #[serde(default)]
    pub effort: Option<String>,
}

/// Output text configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TextConfig {
    #[serde(default)]
    pub format: Option<Value>,
}

/// The response envelope, used for unary responses and inside
/// `response.created` / `response.in_progress` / `response.completed`
/// stream events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: String,

    /// Always "response".
    pub object: String,

    /// Unix timestamp in seconds.
    pub created_at: i64,

    pub status: ResponseStatus,

    pub model: String,

    pub output: Vec<OutputItem>,

    /// Aggregated text of all `output_text` parts.
    pub output_text: String,

    /// Present with a reason when `status` is `incomplete`, null otherwise.
    pub incomplete_details: Option<IncompleteDetails>,

    pub usage: Option<ResponsesUsage>,
}

/// Status of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    InProgress,
    Completed,
    Incomplete,
}

/// Why a response ended without completing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncompleteDetails {
    pub reason: String,
}

/// One item of the response `output[]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutputItem {
    /// Model reasoning preceding the visible answer.
    #[serde(rename = "reasoning")]
    Reasoning { id: String, summary: Vec<SummaryPart> },

    /// The visible assistant message.
    #[serde(rename = "message")]
    Message {
        id: String,
        status: String,
        role: String,
        content: Vec<OutputContent>,
    },

    /// A completed function call.
    #[serde(rename = "function_call")]
    FunctionCall {
        id: String,
        call_id: String,
        name: String,
        arguments: String,
        status: String,
    },
}

/// One part of a reasoning summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryPart {
    /// Always "summary_text".
    pub r#type: String,

    pub text: String,
}

impl SummaryPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            r#type: "summary_text".to_string(),
            text: text.into(),
        }
    }
}

/// One content part of a message output item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutputContent {
    #[serde(rename = "output_text")]
    OutputText {
        text: String,
        annotations: Vec<OutputAnnotation>,
    },
}

/// A URL citation annotation on output text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputAnnotation {
    /// Always "url_citation".
    pub r#type: String,

    pub start_index: u32,

    pub end_index: u32,

    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Token usage in Responses format.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ResponsesUsage {
    pub input_tokens: u32,

    pub output_tokens: u32,

    pub total_tokens: u32,

    pub input_tokens_details: InputTokensDetails,

    pub output_tokens_details: OutputTokensDetails,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
}

/// Input token detail counters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct InputTokensDetails {
    pub cached_tokens: u32,
    pub text_tokens: u32,
    pub audio_tokens: u32,
}

/// Output token detail counters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct OutputTokensDetails {
    pub reasoning_tokens: u32,
    pub text_tokens: u32,
}

/// Streaming event for `POST /v1/responses` with `stream: true`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    #[serde(rename = "response.created")]
    Created { response: Response },

    #[serde(rename = "response.in_progress")]
    InProgress { response: Response },

    #[serde(rename = "response.output_item.added")]
    OutputItemAdded { output_index: u32, item: OutputItem },

    #[serde(rename = "response.content_part.added")]
    ContentPartAdded {
        item_id: String,
        output_index: u32,
        content_index: u32,
        part: OutputContent,
    },

    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta {
        item_id: String,
        output_index: u32,
        content_index: u32,
        delta: String,
    },

    #[serde(rename = "response.output_text.annotation_added")]
    AnnotationAdded {
        item_id: String,
        output_index: u32,
        content_index: u32,
        annotation_index: u32,
        annotation: OutputAnnotation,
    },

    #[serde(rename = "response.function_call_arguments.delta")]
    FunctionCallArgumentsDelta {
        item_id: String,
        output_index: u32,
        delta: String,
    },

    #[serde(rename = "response.content_part.done")]
    ContentPartDone {
        item_id: String,
        output_index: u32,
        content_index: u32,
        part: OutputContent,
    },

    #[serde(rename = "response.output_item.done")]
    OutputItemDone { output_index: u32, item: OutputItem },

    #[serde(rename = "response.output_text.done")]
    OutputTextDone {
        item_id: String,
        output_index: u32,
        content_index: u32,
        text: String,
    },

    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone {
        item_id: String,
        output_index: u32,
        arguments: String,
    },

    #[serde(rename = "response.completed")]
    Completed { response: Response },

    /// Error event; the stream closes after this.
    #[serde(rename = "error")]
    Error { message: String },
}
