//! Wire types for the Ollama chat protocol.
//!
//! Ollama clients send plain-text messages with an optional base64 `images`
//! list and receive NDJSON frames. The same frame shape serves both the
//! unary response and every streaming frame; only `done` and the usage
//! counters differ.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::openai::ChatRole;

/// Request body for `POST /api/chat`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub model: String,

    #[serde(default)]
    pub messages: Vec<ChatRequestMessage>,

    /// Ollama streams by default; `stream: false` selects a unary response.
    #[serde(default)]
    pub stream: Option<bool>,

    /// Tool definitions, copied to the upstream payload unchanged.
    #[serde(default)]
    pub tools: Option<Vec<Value>>,

    /// Model options (`temperature`, `num_predict`, …), spread flat into the
    /// upstream payload.
    #[serde(default)]
    pub options: Option<Map<String, Value>>,
}

/// One message in an Ollama chat request.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequestMessage {
    pub role: ChatRole,

    #[serde(default)]
    pub content: String,

    /// Base64-encoded images without a data-URL prefix.
    #[serde(default)]
    pub images: Option<Vec<String>>,

    #[serde(default)]
    pub tool_calls: Option<Vec<RequestToolCall>>,

    /// For tool result messages, the id of the call being answered.
    #[serde(default)]
    pub tool_call_id: Option<String>,

    #[serde(default)]
    pub name: Option<String>,
}

/// A tool call on an inbound assistant message.
///
/// Ollama clients send `arguments` as an object; some send a pre-encoded
/// string. Both are accepted.
#[derive(Debug, Clone, Deserialize)]
pub struct RequestToolCall {
    #[serde(default)]
    pub id: Option<String>,

    pub function: RequestFunctionCall,
}

/// The function invocation inside an inbound tool call.
#[derive(Debug, Clone, Deserialize)]
pub struct RequestFunctionCall {
    pub name: String,

    #[serde(default)]
    pub arguments: Value,
}

/// A response frame for `/api/chat`, unary or streaming.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub model: String,

    /// RFC 3339 timestamp derived from the upstream `created` seconds.
    pub created_at: String,

    pub message: ResponseMessage,

    pub done: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub done_reason: Option<String>,

    /// Number of prompt tokens, present on the terminal frame.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_eval_count: Option<u32>,

    /// Number of generated tokens, present on the terminal frame.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eval_count: Option<u32>,
}

/// The assistant message inside a response frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub role: ChatRole,

    pub content: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ResponseToolCall>>,
}

/// A completed tool call on a response frame.
///
/// Unlike the upstream wire format, `arguments` is a decoded JSON object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseToolCall {
    pub function: ResponseFunctionCall,
}

/// The function invocation inside a response tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFunctionCall {
    pub name: String,
    pub arguments: Value,
}

/// Response body for `GET /api/tags`.
#[derive(Debug, Clone, Serialize)]
pub struct TagsResponse {
    pub models: Vec<TagModel>,
}

/// One model entry in the tags listing.
#[derive(Debug, Clone, Serialize)]
pub struct TagModel {
    pub name: String,
    pub modified_at: String,
    pub size: u64,
    pub digest: String,
    pub details: TagModelDetails,
}

/// Details block of a tags listing entry.
#[derive(Debug, Clone, Serialize)]
pub struct TagModelDetails {
    pub parent_model: String,
    pub format: String,
    pub family: String,
    pub families: Vec<String>,
    pub parameter_size: String,
    pub quantization_level: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_with_images_and_options_decodes() {
        let request: ChatRequest = serde_json::from_value(json!({
            "model": "gpt-4o",
            "messages": [
                {"role": "user", "content": "what is this?", "images": ["iVBORw0KGgo="]}
            ],
            "options": {"temperature": 0.2, "num_predict": 128},
            "stream": true
        }))
        .unwrap();

        assert_eq!(request.model, "gpt-4o");
        assert_eq!(request.messages[0].images.as_ref().unwrap().len(), 1);
        assert_eq!(
            request.options.as_ref().unwrap().get("num_predict"),
            Some(&json!(128))
        );
    }

    #[test]
    fn tool_call_arguments_accept_object_and_string() {
        let request: ChatRequest = serde_json::from_value(json!({
            "messages": [{
                "role": "assistant",
                "content": "",
                "tool_calls": [
                    {"function": {"name": "a", "arguments": {"x": 1}}},
                    {"function": {"name": "b", "arguments": "{\"y\":2}"}}
                ]
            }]
        }))
        .unwrap();

        let calls = request.messages[0].tool_calls.as_ref().unwrap();
        assert!(calls[0].function.arguments.is_object());
        assert!(calls[1].function.arguments.is_string());
    }

    #[test]
    fn terminal_frame_serializes_usage_counters() {
        let frame = ChatResponse {
            model: "gpt-4o".to_string(),
            created_at: "2024-11-20T10:00:00Z".to_string(),
            message: ResponseMessage {
                role: ChatRole::Assistant,
                content: String::new(),
                tool_calls: None,
            },
            done: true,
            done_reason: Some("stop".to_string()),
            prompt_eval_count: Some(5),
            eval_count: Some(2),
        };

        let value = serde_json::to_value(&frame).unwrap();

        assert_eq!(value["done"], true);
        assert_eq!(value["done_reason"], "stop");
        assert_eq!(value["prompt_eval_count"], 5);
        assert_eq!(value["eval_count"], 2);
        assert!(value.get("tool_calls").is_none());
    }
}
