use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::Value;
use thiserror::Error;

use crate::protocol::anthropic::{ErrorDetails, ErrorResponse};

pub type Result<T> = std::result::Result<T, GatewayError>;

/// Gateway errors with appropriate HTTP status codes.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Local validation failure: schema violations, invalid block/role
    /// combinations, oversized tool buffers.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// No upstream credential configured.
    #[error("OPENAI_API_KEY is required")]
    MissingCredentials,

    /// The upstream returned a non-2xx response. The payload is its body
    /// (or a synthesized `{"error": {"message": …}}` when unparseable).
    #[error("OpenAI upstream error ({status})")]
    Upstream { status: u16, payload: Value },

    /// Network or connection failure talking to the upstream.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Anything else. Not expected to carry upstream details.
    #[error("Internal server error")]
    Internal(String),
}

impl GatewayError {
    /// The HTTP status to respond with. Upstream statuses are mirrored.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::MissingCredentials => StatusCode::UNAUTHORIZED,
            Self::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            Self::Connection(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The Anthropic error kind string for the envelope.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request_error",
            Self::MissingCredentials => "authentication_error",
            Self::Upstream { status, .. } => match status {
                401 => "authentication_error",
                403 => "permission_error",
                404 => "not_found_error",
                429 => "rate_limit_error",
                _ => "api_error",
            },
            Self::Connection(_) | Self::Internal(_) => "api_error",
        }
    }

    /// Message safe to expose to the client. Upstream errors prefer the
    /// upstream's own message text.
    pub fn client_message(&self) -> String {
        match self {
            Self::Upstream { payload, .. } => upstream_error_field(payload, "message")
                .unwrap_or_else(|| "OpenAI upstream error".to_string()),
            other => other.to_string(),
        }
    }

    /// Build the Anthropic-style error envelope for this failure.
    pub fn to_envelope(&self) -> ErrorResponse {
        let (param, code, openai) = match self {
            Self::Upstream { payload, .. } => (
                upstream_error_field(payload, "param"),
                upstream_error_field(payload, "code"),
                Some(payload.clone()),
            ),
            Self::MissingCredentials => {
                // Mirror the upstream envelope shape so clients can treat
                // local credential failures like upstream ones.
                let payload = serde_json::json!({
                    "error": {"message": self.to_string()}
                });
                (None, None, Some(payload))
            }
            _ => (None, None, None),
        };

        ErrorResponse::new(ErrorDetails {
            error_type: self.error_type().to_string(),
            message: self.client_message(),
            param,
            code,
            openai,
        })
    }
}

/// Pull a string field out of an upstream `{"error": {…}}` body. Numeric
/// codes are rendered as their decimal form.
fn upstream_error_field(payload: &Value, field: &str) -> Option<String> {
    let value = payload.get("error")?.get(field)?;

    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// An error rendered as an Anthropic envelope HTTP response.
pub struct AnthropicErrorResponse {
    status: StatusCode,
    body: ErrorResponse,
}

impl From<GatewayError> for AnthropicErrorResponse {
    fn from(error: GatewayError) -> Self {
        Self {
            status: error.status_code(),
            body: error.to_envelope(),
        }
    }
}

impl IntoResponse for AnthropicErrorResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

pub type AnthropicResult<T> = std::result::Result<T, AnthropicErrorResponse>;
