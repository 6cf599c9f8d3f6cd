//! Maps terminal Responses envelopes onto Messages responses.

use serde_json::Value;

use crate::protocol::anthropic::{ContentBlock, MessagesResponse, Role, StopReason, Usage};
use crate::protocol::openai::{OutputContent, OutputItem, ResponsesResult, ResponsesUsage};

/// Derive the Messages `stop_reason` from a terminal upstream envelope.
///
/// First rule that matches wins: a function call anywhere in the output
/// means `tool_use` regardless of the upstream status.
pub fn derive_stop_reason(response: &ResponsesResult) -> StopReason {
    let has_function_call = response
        .output
        .iter()
        .any(|item| matches!(item, OutputItem::FunctionCall { .. }));

    if has_function_call {
        return StopReason::ToolUse;
    }

    if response.status.as_deref() == Some("incomplete") {
        let reason = response
            .incomplete_details
            .as_ref()
            .and_then(|details| details.reason.as_deref());

        return match reason {
            Some("max_output_tokens") => StopReason::MaxTokens,
            Some("content_filter") => StopReason::Refusal,
            other => {
                // Neither API pins down the remaining incomplete reasons.
                log::debug!("upstream incomplete with reason {other:?}, reporting pause_turn");
                StopReason::PauseTurn
            }
        };
    }

    StopReason::EndTurn
}

/// Normalize upstream usage into Messages usage.
///
/// The upstream reports cached prompt tokens inside `input_tokens`;
/// Anthropic clients expect them carved out into
/// `cache_read_input_tokens`, with `input_tokens` never going negative.
pub fn normalize_usage(usage: Option<&ResponsesUsage>) -> Usage {
    let Some(usage) = usage else {
        return Usage::default();
    };

    let input_tokens = usage.input_tokens.unwrap_or(0);
    let cached_tokens = usage
        .input_tokens_details
        .and_then(|details| details.cached_tokens)
        .unwrap_or(0);

    Usage {
        input_tokens: input_tokens.saturating_sub(cached_tokens),
        output_tokens: usage.output_tokens.unwrap_or(0),
        cache_creation_input_tokens: 0,
        cache_read_input_tokens: cached_tokens,
    }
}

/// Parse a tool argument string into the block `input`.
///
/// Returns the parsed object plus the raw string to retain when the
/// arguments were not a valid JSON object.
pub fn parse_tool_input(arguments: Option<&str>) -> (Value, Option<String>) {
    let Some(arguments) = arguments.filter(|arguments| !arguments.is_empty()) else {
        return (Value::Object(Default::default()), None);
    };

    match serde_json::from_str::<Value>(arguments) {
        Ok(value @ Value::Object(_)) => (value, None),
        _ => (
            Value::Object(Default::default()),
            Some(arguments.to_string()),
        ),
    }
}

/// Convert a terminal upstream envelope into a Messages response.
///
/// `inbound_model` is the model name the client sent; clients pick
/// context windows by it, so the resolved upstream name never leaks back.
pub fn map_responses_result(response: &ResponsesResult, inbound_model: &str) -> MessagesResponse {
    let mut content = Vec::new();

    for (position, item) in response.output.iter().enumerate() {
        match item {
            OutputItem::Message { content: parts, .. } => {
                for part in parts {
                    if let OutputContent::OutputText { text } = part {
                        content.push(ContentBlock::text(text.clone()));
                    }
                }
            }
            OutputItem::FunctionCall { id, call_id, name, arguments } => {
                let (input, raw_arguments) = parse_tool_input(arguments.as_deref());

                content.push(ContentBlock::ToolUse {
                    id: call_id
                        .clone()
                        .or_else(|| id.clone())
                        .unwrap_or_else(|| format!("tool_call_{position}")),
                    name: name.clone().unwrap_or_else(|| "unknown_tool".to_string()),
                    input,
                    raw_arguments,
                });
            }
            OutputItem::Other(_) => {}
        }
    }

    MessagesResponse {
        id: response
            .id
            .clone()
            .unwrap_or_else(|| format!("msg_{}", uuid::Uuid::new_v4())),
        r#type: "message".to_string(),
        role: Role::Assistant,
        model: inbound_model.to_string(),
        content,
        stop_reason: Some(derive_stop_reason(response)),
        stop_sequence: None,
        usage: normalize_usage(response.usage.as_ref()),
    }
}
