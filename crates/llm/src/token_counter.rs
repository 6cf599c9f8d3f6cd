//! Input token accounting aligned with the upstream's billing tokenizer.
//!
//! Counts tokens for a *mapped* Responses request without calling the
//! upstream, following the OpenAI cookbook accounting: a fixed overhead
//! per message, the encoded length of every text field, a per-tool
//! overhead plus the encoded tool schema, and a final reply primer. The
//! result is deterministic for a fixed payload.

use tiktoken_rs::{CoreBPE, get_bpe_from_model, o200k_base};

use crate::protocol::openai::{InputItem, ResponsesRequest, ToolSpec};

/// Accounting constants for one model family.
#[derive(Debug, Clone, Copy)]
struct TokenConstants {
    per_message: i64,
    per_name: i64,
    per_function_call: i64,
    per_function_output: i64,
    per_tool: i64,
    reply_primer: i64,
}

const DEFAULT_CONSTANTS: TokenConstants = TokenConstants {
    per_message: 3,
    per_name: 1,
    per_function_call: 3,
    per_function_output: 3,
    per_tool: 7,
    reply_primer: 3,
};

/// Families whose constants deviate from the defaults, keyed by model
/// prefix. The March 2023 gpt-3.5 snapshot used a different message
/// framing per the cookbook.
const CONSTANTS_BY_PREFIX: &[(&str, TokenConstants)] = &[(
    "gpt-3.5-turbo-0301",
    TokenConstants {
        per_message: 4,
        per_name: -1,
        per_function_call: 3,
        per_function_output: 3,
        per_tool: 7,
        reply_primer: 3,
    },
)];

fn constants_for_model(model: &str) -> TokenConstants {
    CONSTANTS_BY_PREFIX
        .iter()
        .find(|(prefix, _)| model.starts_with(prefix))
        .map(|(_, constants)| *constants)
        .unwrap_or(DEFAULT_CONSTANTS)
}

/// The encoding for a model, falling back to `o200k_base` for unknown
/// models. The vocabularies ship with the binary, so the fallback cannot
/// fail to build.
fn encoding_for_model(model: &str) -> CoreBPE {
    get_bpe_from_model(model).unwrap_or_else(|_| o200k_base().expect("bundled o200k_base vocabulary"))
}

fn encoded_len(encoding: &CoreBPE, text: &str) -> i64 {
    encoding.encode_ordinary(text).len() as i64
}

/// Count the input tokens the upstream would bill for a mapped request.
pub fn count_input_tokens(request: &ResponsesRequest) -> u32 {
    let encoding = encoding_for_model(&request.model);
    let constants = constants_for_model(&request.model);

    let mut tokens = 0i64;

    // Instructions are billed like a leading system message.
    if let Some(instructions) = request.instructions.as_deref()
        && !instructions.is_empty()
    {
        tokens += constants.per_message;
        tokens += encoded_len(&encoding, "system");
        tokens += encoded_len(&encoding, instructions);
    }

    for item in &request.input {
        match item {
            InputItem::Message { role, content, name } => {
                tokens += constants.per_message;
                tokens += encoded_len(&encoding, role.as_str());

                let text = content
                    .iter()
                    .map(|part| part.text())
                    .collect::<Vec<_>>()
                    .join("\n");
                tokens += encoded_len(&encoding, &text);

                if let Some(name) = name {
                    tokens += encoded_len(&encoding, name);
                    tokens += constants.per_name;
                }
            }
            InputItem::FunctionCall { name, arguments, .. } => {
                tokens += constants.per_function_call;
                tokens += encoded_len(&encoding, name);
                tokens += encoded_len(&encoding, arguments);
            }
            InputItem::FunctionCallOutput { call_id, output } => {
                tokens += constants.per_function_output;
                tokens += encoded_len(&encoding, call_id);
                tokens += encoded_len(&encoding, output);
            }
        }
    }

    if let Some(tools) = request.tools.as_deref() {
        tokens += count_tool_tokens(&encoding, constants, tools);
    }

    tokens += constants.reply_primer;

    tokens.max(0) as u32
}

fn count_tool_tokens(encoding: &CoreBPE, constants: TokenConstants, tools: &[ToolSpec]) -> i64 {
    let mut tokens = 0i64;

    for tool in tools {
        tokens += constants.per_tool;
        tokens += encoded_len(encoding, &tool.function.name);

        if let Some(description) = tool.function.description.as_deref() {
            tokens += encoded_len(encoding, description);
        }

        // Compact JSON, matching how the upstream serializes the schema
        // into the prompt.
        let parameters = serde_json::to_string(&tool.function.parameters).unwrap_or_default();
        tokens += encoded_len(encoding, &parameters);
    }

    tokens
}
