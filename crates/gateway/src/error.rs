use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::messages::anthropic;

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Gateway errors with appropriate HTTP status codes.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The inbound body is not decodable or mandatory protocol fields are absent.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Token absent, expired and refresh failed, or upstream returned 401.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Upstream returned a non-2xx status.
    #[error("Upstream error ({status}): {message}")]
    UpstreamStatus { status: u16, message: String },

    /// TCP / TLS failure, read timeout, connection reset.
    #[error("Connection error: {0}")]
    Connection(String),

    /// An upstream SSE data line failed JSON decoding.
    #[error("Failed to decode upstream response: {0}")]
    StreamParse(String),

    /// Unexpected internal failure.
    /// If Some(message), it came from upstream and can be shown.
    /// If None, details should not leak to the client.
    #[error("Internal server error")]
    Internal(Option<String>),
}

impl GatewayError {
    /// Get the appropriate HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Authentication(_) => StatusCode::UNAUTHORIZED,
            Self::UpstreamStatus { .. } | Self::Connection(_) | Self::StreamParse(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get the error type string for the response.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request_error",
            Self::Authentication(_) => "authentication_error",
            Self::UpstreamStatus { .. } => "upstream_error",
            Self::Connection(_) => "connection_error",
            Self::StreamParse(_) => "parse_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Message that is safe to expose to API consumers.
    pub fn client_message(&self) -> String {
        match self {
            Self::Internal(Some(upstream_message)) => upstream_message.clone(),
            Self::Internal(None) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Error response body shared by the Ollama, OpenAI and Responses endpoints.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = ErrorBody {
            error: self.error_type(),
            message: self.client_message(),
        };

        (status, Json(body)).into_response()
    }
}

/// Error response in the Anthropic Messages envelope, used by `/v1/messages`.
pub struct AnthropicErrorResponse {
    status: StatusCode,
    body: anthropic::ErrorEnvelope,
}

impl From<GatewayError> for AnthropicErrorResponse {
    fn from(error: GatewayError) -> Self {
        let status = error.status_code();

        let error_type = match &error {
            GatewayError::InvalidRequest(_) => "invalid_request_error",
            GatewayError::Authentication(_) => "authentication_error",
            _ => "api_error",
        };

        let body = anthropic::ErrorEnvelope {
            r#type: "error".to_string(),
            error: anthropic::ErrorDetails {
                r#type: error_type.to_string(),
                message: error.client_message(),
            },
        };

        Self { status, body }
    }
}

impl IntoResponse for AnthropicErrorResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

pub type AnthropicResult<T> = std::result::Result<T, AnthropicErrorResponse>;
