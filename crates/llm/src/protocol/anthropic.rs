//! Wire types for the Anthropic Messages API surface the gateway exposes.
//!
//! The request format is documented in the
//! [Anthropic API Reference](https://docs.anthropic.com/en/api/messages).
//! Clients are inconsistent about a few fields (Claude Code sends message
//! content and tool results as bare strings, and the system prompt as an
//! array of text parts), so those fields get custom deserializers that
//! accept both spellings.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request body for the Messages endpoints.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MessagesRequest {
    /// The client-facing model name. Resolved to an upstream model via the
    /// configured model map; responses echo this name back untouched.
    pub model: String,

    /// The conversation so far. Must not be empty.
    pub messages: Vec<Message>,

    /// System prompt. Either a string or an array of text parts; parts are
    /// joined with newlines at deserialization time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(deserialize_with = "deserialize_system")]
    pub system: Option<String>,

    /// Cap on generated tokens, forwarded as `max_output_tokens`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Tools available to the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDef>>,

    /// Controls how the model uses tools.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,

    /// Whether to stream the response as Server-Sent Events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

/// A single conversation turn.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Message {
    pub role: Role,

    /// Content blocks. A bare string deserializes as one text block.
    #[serde(deserialize_with = "deserialize_content")]
    pub content: Vec<ContentBlock>,
}

/// Role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Content block in a message.
///
/// Every mapping boundary matches exhaustively on this union; unknown
/// block types fail deserialization rather than passing through silently.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    /// Tool invocation requested by the assistant.
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: Value,
        /// Raw upstream argument string, kept when it failed to parse as a
        /// JSON object. `input` is `{}` in that case.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        raw_arguments: Option<String>,
    },

    /// Result of a tool invocation, sent back by the client.
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        #[serde(deserialize_with = "deserialize_tool_result_content")]
        content: Vec<ToolResultContent>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// Content of a tool result. A bare string deserializes as one text block.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ToolResultContent {
    #[serde(rename = "text")]
    Text { text: String },
}

/// Tool definition.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolDef {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// JSON Schema for the tool input. Some clients spell this
    /// `parameters`.
    #[serde(default, alias = "parameters", skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
}

/// Tool choice configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolChoice {
    /// Let the model decide whether to use tools.
    Auto,
    /// Force the model to use any available tool.
    Any,
    /// Forbid tool use.
    None,
    /// Force the model to use a specific tool.
    Tool { name: String },
}

/// Response body for the non-streaming Messages endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesResponse {
    pub id: String,

    /// Always "message".
    pub r#type: String,

    /// Always [`Role::Assistant`].
    pub role: Role,

    /// The client-facing model name from the request, not the upstream
    /// model that actually served it. Clients pick context windows by it.
    pub model: String,

    pub content: Vec<ContentBlock>,

    pub stop_reason: Option<StopReason>,

    pub stop_sequence: Option<String>,

    pub usage: Usage,
}

/// The reason why the model stopped generating tokens.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model reached a natural stopping point.
    EndTurn,
    /// The generation hit the requested output-token cap.
    MaxTokens,
    /// The model produced a configured stop sequence.
    StopSequence,
    /// The model invoked a tool.
    ToolUse,
    /// The upstream filtered the content.
    Refusal,
    /// The upstream stopped for a reason that maps to a resumable pause.
    PauseTurn,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StopReason::EndTurn => "end_turn",
            StopReason::MaxTokens => "max_tokens",
            StopReason::StopSequence => "stop_sequence",
            StopReason::ToolUse => "tool_use",
            StopReason::Refusal => "refusal",
            StopReason::PauseTurn => "pause_turn",
        };
        f.write_str(name)
    }
}

/// Token usage counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
    #[serde(default)]
    pub cache_creation_input_tokens: u32,
    #[serde(default)]
    pub cache_read_input_tokens: u32,
}

/// Response body for the token counting endpoints.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CountTokensResponse {
    pub input_tokens: u32,
}

/// Error details inside the Anthropic error envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetails {
    #[serde(rename = "type")]
    pub error_type: String,

    pub message: String,

    /// Offending request parameter, when the upstream named one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,

    /// Upstream error code, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// Raw upstream error body for debugging.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai: Option<Value>,
}

/// Anthropic-style error envelope. Every failure the gateway surfaces,
/// over HTTP or as an SSE `error` frame, uses this shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(rename = "type")]
    pub response_type: String,

    pub error: ErrorDetails,
}

impl ErrorResponse {
    pub fn new(error: ErrorDetails) -> Self {
        Self {
            response_type: "error".to_string(),
            error,
        }
    }
}

/// Streaming event surface emitted to clients.
///
/// Streams always begin with [`StreamEvent::MessageStart`], emit zero or
/// more content block lifecycles (`content_block_start` →
/// `content_block_delta*` → `content_block_stop`), and finish with
/// `message_delta` followed by a terminal `message_stop`. An `error`
/// event is terminal on its own; no `message_stop` follows it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    MessageStart {
        message: StreamMessageStart,
    },

    ContentBlockStart {
        index: u32,
        content_block: ContentBlock,
    },

    ContentBlockDelta {
        index: u32,
        delta: ContentDelta,
    },

    ContentBlockStop {
        index: u32,
        /// Finalized block payload. Present for tool blocks, where the
        /// accumulated argument fragments have been parsed into `input`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content_block: Option<ContentBlock>,
    },

    MessageDelta {
        delta: MessageDelta,
        usage: Usage,
    },

    MessageStop,

    Ping,

    Error {
        error: ErrorDetails,
    },
}

impl StreamEvent {
    /// The SSE `event:` name for this payload.
    pub fn event_name(&self) -> &'static str {
        match self {
            StreamEvent::MessageStart { .. } => "message_start",
            StreamEvent::ContentBlockStart { .. } => "content_block_start",
            StreamEvent::ContentBlockDelta { .. } => "content_block_delta",
            StreamEvent::ContentBlockStop { .. } => "content_block_stop",
            StreamEvent::MessageDelta { .. } => "message_delta",
            StreamEvent::MessageStop => "message_stop",
            StreamEvent::Ping => "ping",
            StreamEvent::Error { .. } => "error",
        }
    }
}

/// Message metadata carried by `message_start`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamMessageStart {
    pub id: String,

    #[serde(rename = "type")]
    pub message_type: String,

    pub role: Role,

    pub content: Vec<ContentBlock>,

    pub model: String,

    pub stop_reason: Option<StopReason>,

    pub stop_sequence: Option<String>,

    pub usage: Usage,
}

/// Incremental update for a content block.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
}

/// Top-level message changes carried by `message_delta`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDelta {
    pub stop_reason: Option<StopReason>,
    pub stop_sequence: Option<String>,
}

/// Deserializes message content from either a bare string or an array of
/// content blocks.
fn deserialize_content<'de, D>(deserializer: D) -> Result<Vec<ContentBlock>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{self, Visitor};

    struct ContentVisitor;

    impl<'de> Visitor<'de> for ContentVisitor {
        type Value = Vec<ContentBlock>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a string or array of content blocks")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(vec![ContentBlock::text(value)])
        }

        fn visit_string<E>(self, value: String) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(vec![ContentBlock::Text { text: value }])
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: de::SeqAccess<'de>,
        {
            let mut blocks = Vec::new();
            while let Some(block) = seq.next_element::<ContentBlock>()? {
                blocks.push(block);
            }
            Ok(blocks)
        }
    }

    deserializer.deserialize_any(ContentVisitor)
}

/// Deserializes the system prompt from either a string or an array of text
/// parts. Parts are joined with newlines; non-text parts are skipped.
fn deserialize_system<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{self, Visitor};

    struct SystemVisitor;

    impl<'de> Visitor<'de> for SystemVisitor {
        type Value = Option<String>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a string or array of text parts")
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
        where
            D: serde::Deserializer<'de>,
        {
            deserializer.deserialize_any(SystemContentVisitor)
        }
    }

    struct SystemContentVisitor;

    impl<'de> Visitor<'de> for SystemContentVisitor {
        type Value = Option<String>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a string or array of text parts")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value.to_string()))
        }

        fn visit_string<E>(self, value: String) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value))
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: de::SeqAccess<'de>,
        {
            let mut parts = Vec::new();

            while let Some(value) = seq.next_element::<Value>()? {
                if let Some(text) = value.get("text").and_then(|text| text.as_str()) {
                    parts.push(text.to_string());
                } else if let Some(text) = value.as_str() {
                    parts.push(text.to_string());
                }
            }

            if parts.is_empty() {
                Ok(None)
            } else {
                Ok(Some(parts.join("\n")))
            }
        }
    }

    deserializer.deserialize_option(SystemVisitor)
}

/// Deserializes tool result content from either a bare string or an array
/// of text blocks.
fn deserialize_tool_result_content<'de, D>(deserializer: D) -> Result<Vec<ToolResultContent>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{self, Visitor};

    struct ToolResultContentVisitor;

    impl<'de> Visitor<'de> for ToolResultContentVisitor {
        type Value = Vec<ToolResultContent>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a string or array of tool result content blocks")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(vec![ToolResultContent::Text {
                text: value.to_string(),
            }])
        }

        fn visit_string<E>(self, value: String) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(vec![ToolResultContent::Text { text: value }])
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: de::SeqAccess<'de>,
        {
            let mut blocks = Vec::new();
            while let Some(block) = seq.next_element::<ToolResultContent>()? {
                blocks.push(block);
            }
            Ok(blocks)
        }
    }

    deserializer.deserialize_any(ToolResultContentVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserialize_basic_request() {
        let json = json!({
            "model": "claude-3-5-sonnet",
            "max_tokens": 1024,
            "system": "You are terse.",
            "messages": [
                {"role": "user", "content": [{"type": "text", "text": "ping"}]}
            ]
        });

        let request: MessagesRequest = serde_json::from_value(json).unwrap();

        assert_eq!(request.model, "claude-3-5-sonnet");
        assert_eq!(request.max_tokens, Some(1024));
        assert_eq!(request.system.as_deref(), Some("You are terse."));
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].role, Role::User);
    }

    #[test]
    fn deserialize_content_as_string() {
        let msg: Message = serde_json::from_value(json!({
            "role": "user",
            "content": "Hello"
        }))
        .unwrap();

        assert_eq!(msg.content.len(), 1);
        let ContentBlock::Text { text } = &msg.content[0] else {
            unreachable!("expected text content");
        };
        assert_eq!(text, "Hello");
    }

    #[test]
    fn deserialize_system_as_parts() {
        let request: MessagesRequest = serde_json::from_value(json!({
            "model": "claude-3-5-sonnet",
            "system": [
                {"type": "text", "text": "line one"},
                {"type": "text", "text": "line two"}
            ],
            "messages": [{"role": "user", "content": "hi"}]
        }))
        .unwrap();

        assert_eq!(request.system.as_deref(), Some("line one\nline two"));
    }

    #[test]
    fn deserialize_tool_result_with_string_content() {
        let msg: Message = serde_json::from_value(json!({
            "role": "user",
            "content": [
                {
                    "type": "tool_result",
                    "tool_use_id": "toolu_1",
                    "content": "Cargo.toml\nsrc"
                }
            ]
        }))
        .unwrap();

        let ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } = &msg.content[0]
        else {
            unreachable!("expected tool_result content");
        };

        assert_eq!(tool_use_id, "toolu_1");
        assert!(is_error.is_none());
        let ToolResultContent::Text { text } = &content[0];
        assert_eq!(text, "Cargo.toml\nsrc");
    }

    #[test]
    fn deserialize_tool_result_with_array_content() {
        let msg: Message = serde_json::from_value(json!({
            "role": "user",
            "content": [
                {
                    "type": "tool_result",
                    "tool_use_id": "toolu_1",
                    "is_error": true,
                    "content": [
                        {"type": "text", "text": "line 1"},
                        {"type": "text", "text": "line 2"}
                    ]
                }
            ]
        }))
        .unwrap();

        let ContentBlock::ToolResult { content, is_error, .. } = &msg.content[0] else {
            unreachable!("expected tool_result content");
        };

        assert_eq!(content.len(), 2);
        assert_eq!(*is_error, Some(true));
    }

    #[test]
    fn tool_def_accepts_parameters_alias() {
        let tool: ToolDef = serde_json::from_value(json!({
            "name": "get_weather",
            "parameters": {"type": "object", "properties": {}}
        }))
        .unwrap();

        assert!(tool.input_schema.is_some());
    }

    #[test]
    fn deserialize_tool_choice_variants() {
        let auto: ToolChoice = serde_json::from_value(json!({"type": "auto"})).unwrap();
        assert_eq!(auto, ToolChoice::Auto);

        let named: ToolChoice =
            serde_json::from_value(json!({"type": "tool", "name": "get_weather"})).unwrap();
        assert_eq!(
            named,
            ToolChoice::Tool {
                name: "get_weather".to_string()
            }
        );
    }

    #[test]
    fn serialize_response_shape() {
        let response = MessagesResponse {
            id: "resp_1".to_string(),
            r#type: "message".to_string(),
            role: Role::Assistant,
            model: "claude-3-5-sonnet".to_string(),
            content: vec![ContentBlock::text("pong")],
            stop_reason: Some(StopReason::EndTurn),
            stop_sequence: None,
            usage: Usage {
                input_tokens: 2,
                output_tokens: 1,
                ..Default::default()
            },
        };

        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["type"], "message");
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["model"], "claude-3-5-sonnet");
        assert_eq!(json["content"][0]["type"], "text");
        assert_eq!(json["content"][0]["text"], "pong");
        assert_eq!(json["stop_reason"], "end_turn");
        assert_eq!(json["usage"]["input_tokens"], 2);
        assert_eq!(json["usage"]["output_tokens"], 1);
    }

    #[test]
    fn tool_use_without_raw_arguments_omits_the_field() {
        let block = ContentBlock::ToolUse {
            id: "c1".to_string(),
            name: "get_weather".to_string(),
            input: json!({"city": "SF"}),
            raw_arguments: None,
        };

        let json = serde_json::to_value(&block).unwrap();

        assert_eq!(json["type"], "tool_use");
        assert!(json.get("raw_arguments").is_none());
    }

    #[test]
    fn serialize_stream_events() {
        let event = StreamEvent::ContentBlockDelta {
            index: 0,
            delta: ContentDelta::TextDelta {
                text: "Hel".to_string(),
            },
        };

        assert_eq!(event.event_name(), "content_block_delta");

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "content_block_delta");
        assert_eq!(json["index"], 0);
        assert_eq!(json["delta"]["type"], "text_delta");
        assert_eq!(json["delta"]["text"], "Hel");

        let stop = StreamEvent::ContentBlockStop {
            index: 1,
            content_block: None,
        };
        let json = serde_json::to_value(&stop).unwrap();
        assert_eq!(json, json!({"type": "content_block_stop", "index": 1}));
    }

    #[test]
    fn message_delta_wire_format() {
        let event = StreamEvent::MessageDelta {
            delta: MessageDelta {
                stop_reason: Some(StopReason::EndTurn),
                stop_sequence: None,
            },
            usage: Usage {
                output_tokens: 15,
                ..Default::default()
            },
        };

        insta::assert_snapshot!(
            serde_json::to_string(&event).unwrap(),
            @r#"{"type":"message_delta","delta":{"stop_reason":"end_turn","stop_sequence":null},"usage":{"input_tokens":0,"output_tokens":15,"cache_creation_input_tokens":0,"cache_read_input_tokens":0}}"#
        );
    }

    #[test]
    fn serialize_error_envelope() {
        let envelope = ErrorResponse::new(ErrorDetails {
            error_type: "authentication_error".to_string(),
            message: "OPENAI_API_KEY is required".to_string(),
            param: None,
            code: None,
            openai: None,
        });

        let json = serde_json::to_value(&envelope).unwrap();

        assert_eq!(json["type"], "error");
        assert_eq!(json["error"]["type"], "authentication_error");
        assert_eq!(json["error"]["message"], "OPENAI_API_KEY is required");
        assert!(json["error"].get("openai").is_none());
    }
}
