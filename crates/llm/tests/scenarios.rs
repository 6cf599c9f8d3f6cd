//! End-to-end translation scenarios, exercised at the library level: a
//! Messages request is mapped upstream, a canned upstream reply is mapped
//! (or streamed) back, and the resulting client-visible payloads are
//! checked verbatim.

use serde_json::{Value, json};

use llm::mapping::request::map_messages_request;
use llm::mapping::response::map_responses_result;
use llm::mapping::stream::StreamTranslator;
use llm::protocol::anthropic::{MessagesRequest, StreamEvent};
use llm::protocol::openai::{ResponsesResult, ResponsesStreamEvent};
use llm::token_counter::count_input_tokens;

fn messages_request(value: Value) -> MessagesRequest {
    serde_json::from_value(value).unwrap()
}

fn upstream_result(value: Value) -> ResponsesResult {
    serde_json::from_value(value).unwrap()
}

#[test]
fn simple_completion_round_trip() {
    let request = messages_request(json!({
        "model": "claude-3-5-sonnet",
        "messages": [{"role": "user", "content": "ping"}]
    }));

    let mapped = map_messages_request(&request, "gpt-4.1").unwrap();
    assert_eq!(
        serde_json::to_value(&mapped).unwrap(),
        json!({
            "model": "gpt-4.1",
            "input": [
                {
                    "type": "message",
                    "role": "user",
                    "content": [{"type": "input_text", "text": "ping"}]
                }
            ]
        })
    );

    let upstream = upstream_result(json!({
        "id": "resp_1",
        "status": "completed",
        "output": [
            {
                "type": "message",
                "role": "assistant",
                "content": [{"type": "output_text", "text": "pong"}]
            }
        ],
        "usage": {"input_tokens": 2, "output_tokens": 1}
    }));

    let response = map_responses_result(&upstream, &request.model);
    let response = serde_json::to_value(&response).unwrap();

    assert_eq!(response["type"], "message");
    assert_eq!(response["role"], "assistant");
    assert_eq!(response["model"], "claude-3-5-sonnet");
    assert_eq!(response["content"], json!([{"type": "text", "text": "pong"}]));
    assert_eq!(response["stop_reason"], "end_turn");
    assert_eq!(response["usage"]["input_tokens"], 2);
    assert_eq!(response["usage"]["output_tokens"], 1);
}

#[test]
fn tool_call_round_trip() {
    let upstream = upstream_result(json!({
        "id": "resp_2",
        "status": "completed",
        "output": [
            {
                "type": "message",
                "role": "assistant",
                "content": [{"type": "output_text", "text": "Let me check."}]
            },
            {
                "type": "function_call",
                "call_id": "c1",
                "name": "get_weather",
                "arguments": "{\"city\":\"SF\"}"
            }
        ]
    }));

    let response = map_responses_result(&upstream, "claude-3-5-sonnet");
    let response = serde_json::to_value(&response).unwrap();

    assert_eq!(
        response["content"],
        json!([
            {"type": "text", "text": "Let me check."},
            {
                "type": "tool_use",
                "id": "c1",
                "name": "get_weather",
                "input": {"city": "SF"}
            }
        ])
    );
    assert_eq!(response["stop_reason"], "tool_use");
}

#[test]
fn max_tokens_truncation() {
    let upstream = upstream_result(json!({
        "status": "incomplete",
        "incomplete_details": {"reason": "max_output_tokens"},
        "output": [
            {
                "type": "message",
                "role": "assistant",
                "content": [{"type": "output_text", "text": "truncat"}]
            }
        ]
    }));

    let response = map_responses_result(&upstream, "claude-3-5-sonnet");

    assert_eq!(
        serde_json::to_value(&response).unwrap()["stop_reason"],
        "max_tokens"
    );
}

#[test]
fn streaming_tool_arguments() {
    let request = messages_request(json!({
        "model": "claude-3-5-sonnet",
        "messages": [{"role": "user", "content": "weather in SF?"}]
    }));

    let mapped = map_messages_request(&request, "gpt-4.1").unwrap();
    let input_tokens = count_input_tokens(&mapped);

    let mut translator = StreamTranslator::new(request.model.clone(), input_tokens);

    let upstream_events = [
        json!({"type": "response.created", "response": {"id": "resp_3", "model": "gpt-4.1"}}),
        json!({
            "type": "response.output_item.added",
            "output_index": 0,
            "item": {"type": "function_call", "id": "fc_1", "call_id": "c1", "name": "w"}
        }),
        json!({
            "type": "response.function_call_arguments.delta",
            "output_index": 0,
            "item_id": "fc_1",
            "delta": "{\"ci"
        }),
        json!({
            "type": "response.function_call_arguments.delta",
            "output_index": 0,
            "item_id": "fc_1",
            "delta": "ty\":\"SF\"}"
        }),
        json!({
            "type": "response.function_call_arguments.done",
            "output_index": 0,
            "item_id": "fc_1"
        }),
        json!({
            "type": "response.completed",
            "response": {
                "status": "completed",
                "output": [],
                "usage": {"output_tokens": 5}
            }
        }),
    ];

    let mut frames = Vec::new();
    for event in upstream_events {
        let event: ResponsesStreamEvent = serde_json::from_value(event).unwrap();
        frames.extend(translator.apply(event).unwrap());
    }

    let names: Vec<&str> = frames.iter().map(StreamEvent::event_name).collect();
    assert_eq!(
        names,
        vec![
            "message_start",
            "content_block_start",
            "content_block_delta",
            "content_block_delta",
            "content_block_stop",
            "message_delta",
            "message_stop",
        ]
    );

    let payloads: Vec<Value> = frames
        .iter()
        .map(|frame| serde_json::to_value(frame).unwrap())
        .collect();

    // message_start echoes the inbound model and the local token count.
    assert_eq!(payloads[0]["message"]["model"], "claude-3-5-sonnet");
    assert_eq!(
        payloads[0]["message"]["usage"]["input_tokens"],
        u64::from(input_tokens)
    );
    assert_eq!(payloads[0]["message"]["usage"]["output_tokens"], 0);

    assert_eq!(
        payloads[1]["content_block"],
        json!({"type": "tool_use", "id": "c1", "name": "w", "input": {}})
    );

    assert_eq!(payloads[2]["delta"]["partial_json"], "{\"ci");
    assert_eq!(payloads[3]["delta"]["partial_json"], "ty\":\"SF\"}");

    // The finalized input appears only in the closing frame.
    assert_eq!(
        payloads[4]["content_block"]["input"],
        json!({"city": "SF"})
    );

    assert_eq!(payloads[5]["delta"]["stop_reason"], "tool_use");
    assert_eq!(payloads[5]["usage"]["output_tokens"], 5);
    assert_eq!(payloads[6], json!({"type": "message_stop"}));
}

#[test]
fn token_counting_is_deterministic_across_runs() {
    let request = messages_request(json!({
        "model": "claude-3-5-sonnet",
        "system": "Be helpful.",
        "messages": [
            {"role": "user", "content": "What's the weather in SF?"},
            {
                "role": "assistant",
                "content": [
                    {"type": "text", "text": "Checking."},
                    {"type": "tool_use", "id": "c1", "name": "get_weather", "input": {"city": "SF"}}
                ]
            },
            {
                "role": "user",
                "content": [
                    {"type": "tool_result", "tool_use_id": "c1", "content": "sunny"}
                ]
            }
        ],
        "tools": [
            {
                "name": "get_weather",
                "description": "Weather lookup",
                "input_schema": {"type": "object", "properties": {"city": {"type": "string"}}}
            }
        ]
    }));

    let mapped = map_messages_request(&request, "gpt-4.1").unwrap();

    let counts: Vec<u32> = (0..3).map(|_| count_input_tokens(&mapped)).collect();
    assert_eq!(counts[0], counts[1]);
    assert_eq!(counts[1], counts[2]);
}
