//! Wire types for the upstream OpenAI Responses API.
//!
//! Request types serialize exactly what the upstream expects; response and
//! stream types are deliberately lenient. The upstream adds item and event
//! kinds over time, so the tagged unions carry an untagged `Other` /
//! `Unknown` tail that swallows anything unrecognized instead of failing
//! the whole payload.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Request body for `POST {base}/responses`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsesRequest {
    pub model: String,

    /// System prompt, already flattened to a single string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    pub input: Vec<InputItem>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolSpec>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

/// Conversation input item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InputItem {
    #[serde(rename = "message")]
    Message {
        role: InputRole,
        content: Vec<InputContent>,
        /// Optional participant name. Billed with its own overhead by the
        /// upstream tokenizer.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },

    /// A tool invocation the assistant made earlier in the conversation.
    #[serde(rename = "function_call")]
    FunctionCall {
        call_id: String,
        name: String,
        /// JSON-encoded tool input.
        arguments: String,
    },

    /// The caller-supplied result for an earlier invocation.
    #[serde(rename = "function_call_output")]
    FunctionCallOutput { call_id: String, output: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputRole {
    User,
    Assistant,
    System,
    Developer,
}

impl InputRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputRole::User => "user",
            InputRole::Assistant => "assistant",
            InputRole::System => "system",
            InputRole::Developer => "developer",
        }
    }
}

/// Content part inside a `message` input item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InputContent {
    #[serde(rename = "input_text")]
    InputText { text: String },

    /// Prior assistant output replayed as conversation history.
    #[serde(rename = "output_text")]
    OutputText { text: String },
}

impl InputContent {
    pub fn text(&self) -> &str {
        match self {
            InputContent::InputText { text } | InputContent::OutputText { text } => text,
        }
    }
}

/// Tool definition in the upstream's function-tool shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    #[serde(rename = "type")]
    pub spec_type: String,

    pub function: FunctionSpec,
}

impl ToolSpec {
    pub fn function(name: String, description: Option<String>, parameters: Value) -> Self {
        Self {
            spec_type: "function".to_string(),
            function: FunctionSpec {
                name,
                description,
                parameters,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub parameters: Value,
}

/// Normalize a tool parameter schema before sending it upstream.
///
/// The upstream rejects function tools whose object schema omits
/// `properties`; absent schemas become the empty object schema.
pub fn normalize_tool_parameters(schema: Option<&Value>) -> Value {
    let Some(Value::Object(schema)) = schema else {
        return json!({"type": "object", "properties": {}});
    };

    let mut normalized = schema.clone();

    if normalized.get("type").and_then(Value::as_str) == Some("object")
        && !normalized.get("properties").is_some_and(Value::is_object)
    {
        normalized.insert("properties".to_string(), Value::Object(Map::new()));
    }

    Value::Object(normalized)
}

/// Tool choice. Serializes either as a bare mode string or as the
/// function-selector object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolChoice {
    Mode(ToolChoiceMode),
    Function(ToolChoiceFunction),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoiceMode {
    Auto,
    Required,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolChoiceFunction {
    #[serde(rename = "type")]
    pub choice_type: String,

    pub function: FunctionName,
}

impl ToolChoiceFunction {
    pub fn named(name: String) -> Self {
        Self {
            choice_type: "function".to_string(),
            function: FunctionName { name },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionName {
    pub name: String,
}

/// Terminal response envelope, shared by the non-streaming reply and the
/// `response.*` lifecycle events of a stream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponsesResult {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub model: Option<String>,

    /// "completed", "incomplete", "failed", …
    #[serde(default)]
    pub status: Option<String>,

    #[serde(default)]
    pub output: Vec<OutputItem>,

    #[serde(default)]
    pub incomplete_details: Option<IncompleteDetails>,

    #[serde(default)]
    pub usage: Option<ResponsesUsage>,

    /// Failure details on `response.failed`.
    #[serde(default)]
    pub error: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncompleteDetails {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Output item in a terminal response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutputItem {
    #[serde(rename = "message")]
    Message {
        #[serde(default)]
        role: Option<String>,
        #[serde(default)]
        content: Vec<OutputContent>,
    },

    #[serde(rename = "function_call")]
    FunctionCall {
        /// Upstream item id (`fc_…`). Stream argument events reference it.
        #[serde(default)]
        id: Option<String>,
        /// Correlation id (`call_…`) echoed back by tool results.
        #[serde(default)]
        call_id: Option<String>,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        arguments: Option<String>,
    },

    /// Reasoning items and anything else the upstream may add. Not
    /// surfaced to clients.
    #[serde(untagged)]
    Other(Value),
}

/// Content part of a `message` output item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutputContent {
    #[serde(rename = "output_text")]
    OutputText {
        #[serde(default)]
        text: String,
    },

    #[serde(untagged)]
    Other(Value),
}

/// Usage block of a terminal response. Accepts both the Responses API
/// spelling and the older chat-completions one.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ResponsesUsage {
    #[serde(default, alias = "prompt_tokens")]
    pub input_tokens: Option<u32>,

    #[serde(default, alias = "completion_tokens")]
    pub output_tokens: Option<u32>,

    #[serde(default, alias = "prompt_tokens_details")]
    pub input_tokens_details: Option<TokenDetails>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenDetails {
    #[serde(default)]
    pub cached_tokens: Option<u32>,
}

/// Streaming event emitted by the upstream.
///
/// Only the variants the translator acts on are modeled; everything else
/// lands in [`ResponsesStreamEvent::Unknown`] and is ignored at debug log
/// level.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ResponsesStreamEvent {
    #[serde(rename = "response.created")]
    Created {
        #[serde(default)]
        response: ResponsesResult,
    },

    #[serde(rename = "response.output_item.added")]
    OutputItemAdded {
        #[serde(default)]
        output_index: Option<u32>,
        item: OutputItem,
    },

    #[serde(rename = "response.content_part.added")]
    ContentPartAdded {
        #[serde(default)]
        output_index: Option<u32>,
        #[serde(default)]
        content_index: Option<u32>,
        part: ContentPart,
    },

    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta {
        #[serde(default)]
        output_index: Option<u32>,
        #[serde(default)]
        content_index: Option<u32>,
        #[serde(default)]
        delta: String,
    },

    #[serde(rename = "response.output_text.done")]
    OutputTextDone {
        #[serde(default)]
        output_index: Option<u32>,
        #[serde(default)]
        content_index: Option<u32>,
    },

    #[serde(rename = "response.content_part.done")]
    ContentPartDone {
        #[serde(default)]
        output_index: Option<u32>,
        #[serde(default)]
        content_index: Option<u32>,
        part: ContentPart,
    },

    #[serde(rename = "response.function_call_arguments.delta")]
    FunctionCallArgumentsDelta {
        #[serde(default)]
        output_index: Option<u32>,
        #[serde(default)]
        item_id: Option<String>,
        #[serde(default)]
        delta: String,
    },

    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone {
        #[serde(default)]
        output_index: Option<u32>,
        #[serde(default)]
        item_id: Option<String>,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        arguments: Option<String>,
    },

    #[serde(rename = "response.output_item.done")]
    OutputItemDone {
        #[serde(default)]
        output_index: Option<u32>,
        item: OutputItem,
    },

    #[serde(rename = "response.completed")]
    Completed {
        #[serde(default)]
        response: ResponsesResult,
    },

    #[serde(rename = "response.failed")]
    Failed {
        #[serde(default)]
        response: ResponsesResult,
    },

    #[serde(rename = "response.incomplete")]
    Incomplete {
        #[serde(default)]
        response: ResponsesResult,
    },

    #[serde(rename = "ping")]
    Ping,

    #[serde(untagged)]
    Unknown(Value),
}

/// Content part referenced by `response.content_part.*` events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "output_text")]
    OutputText {
        #[serde(default)]
        text: String,
    },

    #[serde(untagged)]
    Other(Value),
}
