//! Maps validated Messages requests onto Responses requests.

use crate::error::{GatewayError, Result};
use crate::protocol::anthropic::{
    ContentBlock, Message, MessagesRequest, Role, ToolChoice, ToolDef, ToolResultContent,
};
use crate::protocol::openai::{
    self, InputContent, InputItem, InputRole, ResponsesRequest, ToolChoiceFunction, ToolChoiceMode,
    ToolSpec,
};

/// Translate a Messages request into the upstream Responses request.
///
/// `upstream_model` is the already-resolved upstream model name; the
/// inbound name never reaches the upstream.
pub fn map_messages_request(request: &MessagesRequest, upstream_model: &str) -> Result<ResponsesRequest> {
    if request.messages.is_empty() {
        return Err(GatewayError::InvalidRequest(
            "messages must not be empty".to_string(),
        ));
    }

    let mut input = Vec::new();

    for message in &request.messages {
        map_message(message, &mut input)?;
    }

    let tools = match request.tools.as_deref() {
        Some(tools) if !tools.is_empty() => Some(tools.iter().map(map_tool).collect()),
        _ => None,
    };

    let tool_choice = map_tool_choice(request)?;

    let instructions = request
        .system
        .clone()
        .filter(|instructions| !instructions.is_empty());

    Ok(ResponsesRequest {
        model: upstream_model.to_string(),
        instructions,
        input,
        tools,
        tool_choice,
        max_output_tokens: request.max_tokens,
        stream: request.stream,
    })
}

/// Convert one message into input items, preserving block order.
///
/// Text blocks buffer into a single `message` item; tool blocks flush the
/// buffer and become standalone `function_call` / `function_call_output`
/// items. A message whose text buffer stays empty contributes only its
/// tool items.
fn map_message(message: &Message, input: &mut Vec<InputItem>) -> Result<()> {
    let role = match message.role {
        Role::User => InputRole::User,
        Role::Assistant => InputRole::Assistant,
    };

    let mut buffered_text = Vec::new();

    for block in &message.content {
        match block {
            ContentBlock::Text { text } => {
                buffered_text.push(text_part(message.role, text.clone()));
            }
            ContentBlock::ToolUse { id, name, input: tool_input, .. } => {
                if message.role != Role::Assistant {
                    return Err(GatewayError::InvalidRequest(
                        "tool_use blocks are only valid in assistant messages".to_string(),
                    ));
                }

                flush_text(role, &mut buffered_text, input);

                let arguments = serde_json::to_string(tool_input).map_err(|e| {
                    GatewayError::InvalidRequest(format!(
                        "tool_use input for '{name}' is not serializable: {e}"
                    ))
                })?;

                input.push(InputItem::FunctionCall {
                    call_id: id.clone(),
                    name: name.clone(),
                    arguments,
                });
            }
            ContentBlock::ToolResult { tool_use_id, content, .. } => {
                if message.role != Role::User {
                    return Err(GatewayError::InvalidRequest(
                        "tool_result blocks are only valid in user messages".to_string(),
                    ));
                }

                flush_text(role, &mut buffered_text, input);

                input.push(InputItem::FunctionCallOutput {
                    call_id: tool_use_id.clone(),
                    output: flatten_tool_result(content),
                });
            }
        }
    }

    flush_text(role, &mut buffered_text, input);

    Ok(())
}

fn text_part(role: Role, text: String) -> InputContent {
    match role {
        Role::User => InputContent::InputText { text },
        Role::Assistant => InputContent::OutputText { text },
    }
}

fn flush_text(role: InputRole, buffered: &mut Vec<InputContent>, input: &mut Vec<InputItem>) {
    if buffered.is_empty() {
        return;
    }

    input.push(InputItem::Message {
        role,
        content: std::mem::take(buffered),
        name: None,
    });
}

fn flatten_tool_result(content: &[ToolResultContent]) -> String {
    content
        .iter()
        .map(|block| {
            let ToolResultContent::Text { text } = block;
            text.as_str()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn map_tool(tool: &ToolDef) -> ToolSpec {
    ToolSpec::function(
        tool.name.clone(),
        tool.description.clone(),
        openai::normalize_tool_parameters(tool.input_schema.as_ref()),
    )
}

fn map_tool_choice(request: &MessagesRequest) -> Result<Option<openai::ToolChoice>> {
    let Some(choice) = &request.tool_choice else {
        return Ok(None);
    };

    let mapped = match choice {
        ToolChoice::Auto => openai::ToolChoice::Mode(ToolChoiceMode::Auto),
        ToolChoice::Any => openai::ToolChoice::Mode(ToolChoiceMode::Required),
        ToolChoice::None => openai::ToolChoice::Mode(ToolChoiceMode::None),
        ToolChoice::Tool { name } => {
            let declared = request
                .tools
                .as_deref()
                .is_some_and(|tools| tools.iter().any(|tool| tool.name == *name));

            if !declared {
                return Err(GatewayError::InvalidRequest(format!(
                    "tool_choice references undeclared tool '{name}'"
                )));
            }

            openai::ToolChoice::Function(ToolChoiceFunction::named(name.clone()))
        }
    };

    Ok(Some(mapped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(value: serde_json::Value) -> MessagesRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn maps_minimal_request() {
        let request = request(json!({
            "model": "claude-3-5-sonnet",
            "messages": [{"role": "user", "content": "ping"}]
        }));

        let mapped = map_messages_request(&request, "gpt-4.1").unwrap();

        assert_eq!(mapped.model, "gpt-4.1");
        assert!(mapped.instructions.is_none());
        assert!(mapped.tools.is_none());
        assert_eq!(
            serde_json::to_value(&mapped.input).unwrap(),
            json!([
                {
                    "type": "message",
                    "role": "user",
                    "content": [{"type": "input_text", "text": "ping"}]
                }
            ])
        );
    }

    #[test]
    fn system_string_becomes_instructions() {
        let request = request(json!({
            "model": "claude-3-5-sonnet",
            "system": "Be terse.",
            "messages": [{"role": "user", "content": "hi"}]
        }));

        let mapped = map_messages_request(&request, "gpt-4.1").unwrap();

        assert_eq!(mapped.instructions.as_deref(), Some("Be terse."));
    }

    #[test]
    fn empty_system_is_omitted() {
        let request = request(json!({
            "model": "claude-3-5-sonnet",
            "system": "",
            "messages": [{"role": "user", "content": "hi"}]
        }));

        let mapped = map_messages_request(&request, "gpt-4.1").unwrap();

        assert!(mapped.instructions.is_none());
    }

    #[test]
    fn assistant_text_uses_output_text_parts() {
        let request = request(json!({
            "model": "claude-3-5-sonnet",
            "messages": [
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": "hello"}
            ]
        }));

        let mapped = map_messages_request(&request, "gpt-4.1").unwrap();

        assert_eq!(
            serde_json::to_value(&mapped.input[1]).unwrap(),
            json!({
                "type": "message",
                "role": "assistant",
                "content": [{"type": "output_text", "text": "hello"}]
            })
        );
    }

    #[test]
    fn mixed_blocks_preserve_order() {
        let request = request(json!({
            "model": "claude-3-5-sonnet",
            "messages": [
                {
                    "role": "assistant",
                    "content": [
                        {"type": "text", "text": "Let me check."},
                        {
                            "type": "tool_use",
                            "id": "c1",
                            "name": "get_weather",
                            "input": {"city": "SF"}
                        },
                        {"type": "text", "text": "Working on it."}
                    ]
                }
            ]
        }));

        let mapped = map_messages_request(&request, "gpt-4.1").unwrap();
        let items = serde_json::to_value(&mapped.input).unwrap();

        assert_eq!(items[0]["type"], "message");
        assert_eq!(items[0]["content"][0]["text"], "Let me check.");
        assert_eq!(items[1]["type"], "function_call");
        assert_eq!(items[1]["call_id"], "c1");
        assert_eq!(items[1]["arguments"], r#"{"city":"SF"}"#);
        assert_eq!(items[2]["type"], "message");
        assert_eq!(items[2]["content"][0]["text"], "Working on it.");
    }

    #[test]
    fn tool_result_flattens_to_function_call_output() {
        let request = request(json!({
            "model": "claude-3-5-sonnet",
            "messages": [
                {
                    "role": "user",
                    "content": [
                        {
                            "type": "tool_result",
                            "tool_use_id": "c1",
                            "content": [
                                {"type": "text", "text": "sunny"},
                                {"type": "text", "text": "18C"}
                            ]
                        }
                    ]
                }
            ]
        }));

        let mapped = map_messages_request(&request, "gpt-4.1").unwrap();

        assert_eq!(
            serde_json::to_value(&mapped.input).unwrap(),
            json!([
                {
                    "type": "function_call_output",
                    "call_id": "c1",
                    "output": "sunny\n18C"
                }
            ])
        );
    }

    #[test]
    fn rejects_empty_messages() {
        let request = request(json!({
            "model": "claude-3-5-sonnet",
            "messages": []
        }));

        let error = map_messages_request(&request, "gpt-4.1").unwrap_err();
        assert!(matches!(error, GatewayError::InvalidRequest(_)));
    }

    #[test]
    fn rejects_tool_use_in_user_message() {
        let request = request(json!({
            "model": "claude-3-5-sonnet",
            "messages": [
                {
                    "role": "user",
                    "content": [
                        {"type": "tool_use", "id": "c1", "name": "t", "input": {}}
                    ]
                }
            ]
        }));

        let error = map_messages_request(&request, "gpt-4.1").unwrap_err();
        assert!(matches!(error, GatewayError::InvalidRequest(_)));
    }

    #[test]
    fn rejects_tool_result_in_assistant_message() {
        let request = request(json!({
            "model": "claude-3-5-sonnet",
            "messages": [
                {
                    "role": "assistant",
                    "content": [
                        {"type": "tool_result", "tool_use_id": "c1", "content": "done"}
                    ]
                }
            ]
        }));

        let error = map_messages_request(&request, "gpt-4.1").unwrap_err();
        assert!(matches!(error, GatewayError::InvalidRequest(_)));
    }

    #[test]
    fn maps_tools_and_normalizes_schemas() {
        let request = request(json!({
            "model": "claude-3-5-sonnet",
            "messages": [{"role": "user", "content": "hi"}],
            "tools": [
                {"name": "get_weather", "description": "Weather lookup"},
                {
                    "name": "search",
                    "input_schema": {"type": "object", "properties": {"q": {"type": "string"}}}
                }
            ]
        }));

        let mapped = map_messages_request(&request, "gpt-4.1").unwrap();
        let tools = serde_json::to_value(mapped.tools.unwrap()).unwrap();

        assert_eq!(
            tools[0],
            json!({
                "type": "function",
                "function": {
                    "name": "get_weather",
                    "description": "Weather lookup",
                    "parameters": {"type": "object", "properties": {}}
                }
            })
        );
        assert_eq!(
            tools[1]["function"]["parameters"]["properties"]["q"]["type"],
            "string"
        );
    }

    #[test]
    fn maps_tool_choice_variants() {
        for (choice, expected) in [
            (json!({"type": "auto"}), json!("auto")),
            (json!({"type": "any"}), json!("required")),
            (json!({"type": "none"}), json!("none")),
            (
                json!({"type": "tool", "name": "get_weather"}),
                json!({"type": "function", "function": {"name": "get_weather"}}),
            ),
        ] {
            let request = request(json!({
                "model": "claude-3-5-sonnet",
                "messages": [{"role": "user", "content": "hi"}],
                "tools": [{"name": "get_weather"}],
                "tool_choice": choice
            }));

            let mapped = map_messages_request(&request, "gpt-4.1").unwrap();
            assert_eq!(serde_json::to_value(mapped.tool_choice.unwrap()).unwrap(), expected);
        }
    }

    #[test]
    fn rejects_undeclared_tool_choice() {
        let request = request(json!({
            "model": "claude-3-5-sonnet",
            "messages": [{"role": "user", "content": "hi"}],
            "tool_choice": {"type": "tool", "name": "missing"}
        }));

        let error = map_messages_request(&request, "gpt-4.1").unwrap_err();
        assert!(matches!(error, GatewayError::InvalidRequest(_)));
    }

    #[test]
    fn forwards_caps_and_stream_flag() {
        let request = request(json!({
            "model": "claude-3-5-sonnet",
            "max_tokens": 8,
            "stream": true,
            "messages": [{"role": "user", "content": "hi"}]
        }));

        let mapped = map_messages_request(&request, "gpt-4.1").unwrap();

        assert_eq!(mapped.max_output_tokens, Some(8));
        assert_eq!(mapped.stream, Some(true));
    }
}
