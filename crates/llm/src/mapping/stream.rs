//! Stateful translation of upstream Responses streaming events into the
//! Messages SSE event sequence.
//!
//! The translator is a pure state machine: [`StreamTranslator::apply`]
//! consumes one upstream event and returns the downstream frames it
//! produces, without performing any I/O. The driver in the handler feeds
//! it from the upstream SSE stream and writes the frames out.
//!
//! Downstream frames obey the Messages lifecycle: `message_start`, then
//! zero or more `content_block_start` / `content_block_delta*` /
//! `content_block_stop` cycles, then `message_delta` and a single
//! `message_stop`. Tool-argument JSON accumulates in per-block buffers and
//! is parsed exactly once, when the block closes.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::error::{GatewayError, Result};
use crate::mapping::response::{derive_stop_reason, normalize_usage, parse_tool_input};
use crate::protocol::anthropic::{
    ContentBlock, ContentDelta, MessageDelta, Role, StopReason, StreamEvent, StreamMessageStart,
    Usage,
};
use crate::protocol::openai::{
    ContentPart, OutputItem, ResponsesResult, ResponsesStreamEvent,
};

/// Soft cap on accumulated tool-argument bytes per block.
const TOOL_BUFFER_CAP: usize = 1 << 20;

/// Which downstream block kind an upstream position maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum BlockKind {
    Text,
    ToolUse,
}

/// Identity of an upstream content position. Missing indices are folded
/// to `-1` so events without them still correlate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct BlockKey {
    output_index: i64,
    content_index: i64,
    kind: BlockKind,
}

impl BlockKey {
    fn new(output_index: Option<u32>, content_index: Option<u32>, kind: BlockKind) -> Option<Self> {
        if output_index.is_none() && content_index.is_none() {
            return None;
        }

        Some(Self {
            output_index: output_index.map_or(-1, i64::from),
            content_index: content_index.map_or(-1, i64::from),
            kind,
        })
    }
}

#[derive(Debug, Default)]
struct ToolMeta {
    id: Option<String>,
    name: Option<String>,
}

impl ToolMeta {
    fn is_complete(&self) -> bool {
        self.id.is_some() && self.name.is_some()
    }
}

/// Per-request translation state.
pub struct StreamTranslator {
    inbound_model: String,
    /// Locally computed input token count, reported in `message_start`.
    input_tokens: u32,

    message_started: bool,
    message_stopped: bool,

    next_block_index: u32,
    block_index_by_key: HashMap<BlockKey, u32>,
    last_block_index: Option<u32>,

    /// Text blocks that have been opened and not yet closed.
    open_text_blocks: HashSet<u32>,
    completed_text_blocks: HashSet<u32>,

    /// Accumulating argument fragments per tool block.
    tool_buffers: HashMap<u32, String>,
    tool_meta: HashMap<u32, ToolMeta>,
    /// Upstream item id (`fc_…`) and call id (`call_…`) → block index.
    tool_block_by_item_id: HashMap<String, u32>,
    started_tool_blocks: HashSet<u32>,
    completed_tool_blocks: HashSet<u32>,

    saw_tool_call: bool,
    /// Cumulative usage captured from the terminal event.
    usage: Usage,
}

impl StreamTranslator {
    pub fn new(inbound_model: impl Into<String>, input_tokens: u32) -> Self {
        Self {
            inbound_model: inbound_model.into(),
            input_tokens,
            message_started: false,
            message_stopped: false,
            next_block_index: 0,
            block_index_by_key: HashMap::new(),
            last_block_index: None,
            open_text_blocks: HashSet::new(),
            completed_text_blocks: HashSet::new(),
            tool_buffers: HashMap::new(),
            tool_meta: HashMap::new(),
            tool_block_by_item_id: HashMap::new(),
            started_tool_blocks: HashSet::new(),
            completed_tool_blocks: HashSet::new(),
            saw_tool_call: false,
            usage: Usage::default(),
        }
    }

    pub fn message_started(&self) -> bool {
        self.message_started
    }

    pub fn message_stopped(&self) -> bool {
        self.message_stopped
    }

    /// Cumulative usage observed from the terminal upstream event.
    pub fn usage(&self) -> Usage {
        self.usage
    }

    /// Feed one upstream event, producing zero or more downstream frames.
    ///
    /// An error means the stream must be torn down: the caller emits the
    /// error envelope as an `error` frame and stops reading.
    pub fn apply(&mut self, event: ResponsesStreamEvent) -> Result<Vec<StreamEvent>> {
        let mut frames = Vec::new();

        // Heartbeats pass through without forcing the message open.
        if matches!(event, ResponsesStreamEvent::Ping) {
            frames.push(StreamEvent::Ping);
            return Ok(frames);
        }

        // Failures short-circuit without opening the message, so the
        // driver can still choose between an HTTP error and an SSE error
        // frame based on what has actually been sent.
        if !matches!(event, ResponsesStreamEvent::Failed { .. }) {
            let response = match &event {
                ResponsesStreamEvent::Created { response }
                | ResponsesStreamEvent::Completed { response }
                | ResponsesStreamEvent::Incomplete { response } => Some(response),
                _ => None,
            };
            self.ensure_message_started(response, &mut frames);
        }

        match event {
            ResponsesStreamEvent::Ping | ResponsesStreamEvent::Created { .. } => {}

            ResponsesStreamEvent::OutputItemAdded { output_index, item } => {
                self.on_output_item_added(output_index, &item, &mut frames)?;
            }

            ResponsesStreamEvent::ContentPartAdded { output_index, content_index, part } => {
                if matches!(part, ContentPart::OutputText { .. }) {
                    self.open_text_block(output_index, content_index, &mut frames);
                }
            }

            ResponsesStreamEvent::OutputTextDelta { output_index, content_index, delta } => {
                let index = self.open_text_block(output_index, content_index, &mut frames);

                frames.push(StreamEvent::ContentBlockDelta {
                    index,
                    delta: ContentDelta::TextDelta { text: delta },
                });
            }

            ResponsesStreamEvent::OutputTextDone { output_index, content_index } => {
                self.close_text_block(output_index, content_index, &mut frames);
            }

            ResponsesStreamEvent::ContentPartDone { output_index, content_index, part } => {
                if matches!(part, ContentPart::OutputText { .. }) {
                    self.close_text_block(output_index, content_index, &mut frames);
                }
            }

            ResponsesStreamEvent::FunctionCallArgumentsDelta { output_index, item_id, delta } => {
                self.saw_tool_call = true;

                let index = self.bind_tool_block(output_index, item_id.as_deref(), None);
                self.start_tool_block_if_ready(index, &mut frames);
                self.append_tool_arguments(index, &delta, &mut frames)?;
            }

            ResponsesStreamEvent::FunctionCallArgumentsDone {
                output_index,
                item_id,
                name,
                arguments,
            } => {
                self.saw_tool_call = true;

                let index = self.bind_tool_block(output_index, item_id.as_deref(), name.as_deref());

                if !self.completed_tool_blocks.contains(&index) {
                    self.force_tool_start(index, &mut frames);

                    // The done event may carry the full argument string
                    // when no deltas were streamed; surface it as one
                    // fragment so the delta concatenation stays complete.
                    let buffered_empty = self
                        .tool_buffers
                        .get(&index)
                        .is_none_or(|buffer| buffer.is_empty());

                    if buffered_empty
                        && let Some(arguments) = arguments.as_deref()
                        && !arguments.is_empty()
                    {
                        self.append_tool_arguments(index, arguments, &mut frames)?;
                        self.close_tool_block(index, None, &mut frames);
                    } else {
                        self.close_tool_block(index, arguments.as_deref(), &mut frames);
                    }
                }
            }

            ResponsesStreamEvent::OutputItemDone { output_index, item } => {
                self.on_output_item_done(output_index, &item, &mut frames)?;
            }

            ResponsesStreamEvent::Completed { response }
            | ResponsesStreamEvent::Incomplete { response } => {
                self.on_terminal(&response, &mut frames);
            }

            ResponsesStreamEvent::Failed { response } => {
                let payload = response
                    .error
                    .map(|error| serde_json::json!({ "error": error }))
                    .unwrap_or_else(|| {
                        serde_json::json!({
                            "error": {"message": "upstream response failed"}
                        })
                    });

                return Err(GatewayError::Upstream { status: 500, payload });
            }

            ResponsesStreamEvent::Unknown(value) => {
                let kind = value.get("type").and_then(Value::as_str).unwrap_or("?");
                log::debug!("ignoring unknown upstream stream event: {kind}");
            }
        }

        Ok(frames)
    }

    /// Flush the stream after the upstream ends without a terminal event.
    ///
    /// Closes any open blocks and emits `message_delta` / `message_stop`
    /// exactly once, so clients always observe a complete lifecycle.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut frames = Vec::new();

        if !self.message_started || self.message_stopped {
            return frames;
        }

        self.close_open_blocks(&mut frames);

        let stop_reason = if self.saw_tool_call {
            StopReason::ToolUse
        } else {
            StopReason::EndTurn
        };

        self.emit_message_stop(stop_reason, &mut frames);
        frames
    }

    fn ensure_message_started(&mut self, response: Option<&ResponsesResult>, frames: &mut Vec<StreamEvent>) {
        if self.message_started {
            return;
        }

        self.message_started = true;

        let id = response
            .and_then(|response| response.id.clone())
            .unwrap_or_else(|| format!("msg_{}", uuid::Uuid::new_v4()));

        frames.push(StreamEvent::MessageStart {
            message: StreamMessageStart {
                id,
                message_type: "message".to_string(),
                role: Role::Assistant,
                content: Vec::new(),
                model: self.inbound_model.clone(),
                stop_reason: None,
                stop_sequence: None,
                usage: Usage {
                    input_tokens: self.input_tokens,
                    ..Default::default()
                },
            },
        });
    }

    fn allocate_block_index(&mut self, key: Option<BlockKey>) -> u32 {
        let index = self.next_block_index;
        self.next_block_index += 1;

        if let Some(key) = key {
            self.block_index_by_key.insert(key, index);
        }

        self.last_block_index = Some(index);
        index
    }

    /// Resolve an upstream position to a block index, allocating when
    /// unseen. Events with no indices at all stick to the most recently
    /// allocated block.
    fn get_or_create_block_index(&mut self, key: Option<BlockKey>) -> (u32, bool) {
        if let Some(key) = key
            && let Some(&index) = self.block_index_by_key.get(&key)
        {
            return (index, false);
        }

        if key.is_none()
            && let Some(index) = self.last_block_index
        {
            return (index, false);
        }

        (self.allocate_block_index(key), true)
    }

    fn open_text_block(
        &mut self,
        output_index: Option<u32>,
        content_index: Option<u32>,
        frames: &mut Vec<StreamEvent>,
    ) -> u32 {
        let key = BlockKey::new(output_index, content_index, BlockKind::Text);
        let (index, created) = self.get_or_create_block_index(key);

        if created {
            self.open_text_blocks.insert(index);
            frames.push(StreamEvent::ContentBlockStart {
                index,
                content_block: ContentBlock::text(""),
            });
        }

        index
    }

    fn close_text_block(
        &mut self,
        output_index: Option<u32>,
        content_index: Option<u32>,
        frames: &mut Vec<StreamEvent>,
    ) {
        let key = BlockKey::new(output_index, content_index, BlockKind::Text);
        let (index, _) = self.get_or_create_block_index(key);

        if self.completed_text_blocks.insert(index) {
            self.open_text_blocks.remove(&index);
            frames.push(StreamEvent::ContentBlockStop {
                index,
                content_block: None,
            });
        }
    }

    /// Resolve the block index for a tool event, binding any ids it
    /// carries and recording metadata.
    fn bind_tool_block(
        &mut self,
        output_index: Option<u32>,
        item_id: Option<&str>,
        name: Option<&str>,
    ) -> u32 {
        let bound = item_id.and_then(|id| self.tool_block_by_item_id.get(id).copied());

        let index = match bound {
            Some(index) => index,
            None => {
                let key = BlockKey::new(output_index, None, BlockKind::ToolUse);
                let (index, created) = self.get_or_create_block_index(key);

                if created {
                    self.tool_buffers.insert(index, String::new());
                }

                index
            }
        };

        if let Some(id) = item_id {
            self.tool_block_by_item_id.entry(id.to_string()).or_insert(index);
        }

        let meta = self.tool_meta.entry(index).or_default();
        if meta.name.is_none()
            && let Some(name) = name
        {
            meta.name = Some(name.to_string());
        }

        index
    }

    fn on_output_item_added(
        &mut self,
        output_index: Option<u32>,
        item: &OutputItem,
        frames: &mut Vec<StreamEvent>,
    ) -> Result<()> {
        let OutputItem::FunctionCall { id, call_id, name, arguments } = item else {
            // Message items open their text block on the first text part;
            // reasoning and other item kinds are not surfaced.
            return Ok(());
        };

        self.saw_tool_call = true;

        let index = self.bind_tool_block(output_index, id.as_deref(), name.as_deref());

        if let Some(call_id) = call_id {
            self.tool_block_by_item_id
                .entry(call_id.clone())
                .or_insert(index);

            let meta = self.tool_meta.entry(index).or_default();
            if meta.id.is_none() {
                meta.id = Some(call_id.clone());
            }
        }

        self.tool_buffers.entry(index).or_default();
        self.start_tool_block_if_ready(index, frames);

        if let Some(arguments) = arguments.as_deref()
            && !arguments.is_empty()
        {
            self.append_tool_arguments(index, arguments, frames)?;
        }

        Ok(())
    }

    fn on_output_item_done(
        &mut self,
        output_index: Option<u32>,
        item: &OutputItem,
        frames: &mut Vec<StreamEvent>,
    ) -> Result<()> {
        match item {
            OutputItem::FunctionCall { id, call_id, name, arguments } => {
                self.saw_tool_call = true;

                let lookup_id = call_id.as_deref().or(id.as_deref());
                let index = self.bind_tool_block(output_index, lookup_id, name.as_deref());

                if self.completed_tool_blocks.contains(&index) {
                    return Ok(());
                }

                if let Some(call_id) = call_id {
                    let meta = self.tool_meta.entry(index).or_default();
                    if meta.id.is_none() {
                        meta.id = Some(call_id.clone());
                    }
                }

                self.force_tool_start(index, frames);

                // A done item may carry the full argument string when no
                // delta events were observed.
                let buffered_empty = self
                    .tool_buffers
                    .get(&index)
                    .is_none_or(|buffer| buffer.is_empty());

                let final_arguments = arguments.as_deref().filter(|_| buffered_empty);

                if let Some(arguments) = final_arguments
                    && !arguments.is_empty()
                {
                    self.append_tool_arguments(index, arguments, frames)?;
                }

                self.close_tool_block(index, None, frames);
                Ok(())
            }
            OutputItem::Message { .. } => {
                // Some upstreams skip content_part.done; make sure the
                // item's text block still closes.
                let open: Vec<u32> = self
                    .open_text_blocks
                    .iter()
                    .copied()
                    .filter(|index| match output_index {
                        Some(oi) => self
                            .block_index_by_key
                            .iter()
                            .any(|(key, block)| {
                                block == index
                                    && key.kind == BlockKind::Text
                                    && key.output_index == i64::from(oi)
                            }),
                        None => true,
                    })
                    .collect();

                for index in open {
                    if self.completed_text_blocks.insert(index) {
                        self.open_text_blocks.remove(&index);
                        frames.push(StreamEvent::ContentBlockStop {
                            index,
                            content_block: None,
                        });
                    }
                }

                Ok(())
            }
            OutputItem::Other(_) => Ok(()),
        }
    }

    /// Emit the deferred `content_block_start` for a tool block once both
    /// id and name are known, replaying any buffered fragments.
    fn start_tool_block_if_ready(&mut self, index: u32, frames: &mut Vec<StreamEvent>) {
        if self.started_tool_blocks.contains(&index) {
            return;
        }

        let Some(meta) = self.tool_meta.get(&index) else {
            return;
        };

        if !meta.is_complete() {
            return;
        }

        self.emit_tool_start(index, frames);
    }

    /// Start a tool block unconditionally, filling in fallback metadata.
    /// Used on done-events, which must close the block whatever upstream
    /// forgot to send.
    fn force_tool_start(&mut self, index: u32, frames: &mut Vec<StreamEvent>) {
        if self.started_tool_blocks.contains(&index) {
            return;
        }

        let meta = self.tool_meta.entry(index).or_default();

        if meta.id.is_none() {
            meta.id = Some(format!("tool_call_{index}"));
        }
        if meta.name.is_none() {
            meta.name = Some("unknown_tool".to_string());
        }

        self.emit_tool_start(index, frames);
    }

    fn emit_tool_start(&mut self, index: u32, frames: &mut Vec<StreamEvent>) {
        self.started_tool_blocks.insert(index);

        let meta = self.tool_meta.entry(index).or_default();

        frames.push(StreamEvent::ContentBlockStart {
            index,
            content_block: ContentBlock::ToolUse {
                id: meta.id.clone().unwrap_or_default(),
                name: meta.name.clone().unwrap_or_default(),
                input: Value::Object(Default::default()),
                raw_arguments: None,
            },
        });

        let buffered = self
            .tool_buffers
            .get(&index)
            .filter(|buffer| !buffer.is_empty())
            .cloned();

        if let Some(buffered) = buffered {
            frames.push(StreamEvent::ContentBlockDelta {
                index,
                delta: ContentDelta::InputJsonDelta {
                    partial_json: buffered,
                },
            });
        }
    }

    /// Append an argument fragment, enforcing the per-block buffer cap.
    /// The fragment is only surfaced downstream once the block started.
    fn append_tool_arguments(
        &mut self,
        index: u32,
        partial_json: &str,
        frames: &mut Vec<StreamEvent>,
    ) -> Result<()> {
        if partial_json.is_empty() {
            return Ok(());
        }

        let buffer = self.tool_buffers.entry(index).or_default();

        if buffer.len() + partial_json.len() > TOOL_BUFFER_CAP {
            return Err(GatewayError::InvalidRequest(format!(
                "tool arguments for block {index} exceed the {TOOL_BUFFER_CAP} byte limit"
            )));
        }

        buffer.push_str(partial_json);

        if self.started_tool_blocks.contains(&index) {
            frames.push(StreamEvent::ContentBlockDelta {
                index,
                delta: ContentDelta::InputJsonDelta {
                    partial_json: partial_json.to_string(),
                },
            });
        }

        Ok(())
    }

    /// Parse the accumulated buffer (exactly once) and close the block,
    /// carrying the finalized payload on the stop frame.
    fn close_tool_block(
        &mut self,
        index: u32,
        final_arguments: Option<&str>,
        frames: &mut Vec<StreamEvent>,
    ) {
        let buffer = self.tool_buffers.remove(&index).unwrap_or_default();
        let raw = final_arguments.unwrap_or(buffer.as_str());

        let (input, raw_arguments) = if raw.is_empty() {
            (Value::Object(Default::default()), None)
        } else {
            parse_tool_input(Some(raw))
        };

        let meta = self.tool_meta.get(&index);

        self.completed_tool_blocks.insert(index);

        frames.push(StreamEvent::ContentBlockStop {
            index,
            content_block: Some(ContentBlock::ToolUse {
                id: meta.and_then(|meta| meta.id.clone()).unwrap_or_default(),
                name: meta.and_then(|meta| meta.name.clone()).unwrap_or_default(),
                input,
                raw_arguments,
            }),
        });
    }

    /// Close every block still open, in index order.
    fn close_open_blocks(&mut self, frames: &mut Vec<StreamEvent>) {
        let mut open_text: Vec<u32> = self.open_text_blocks.iter().copied().collect();
        open_text.sort_unstable();

        for index in open_text {
            if self.completed_text_blocks.insert(index) {
                self.open_text_blocks.remove(&index);
                frames.push(StreamEvent::ContentBlockStop {
                    index,
                    content_block: None,
                });
            }
        }

        let mut open_tools: Vec<u32> = self
            .started_tool_blocks
            .iter()
            .copied()
            .filter(|index| !self.completed_tool_blocks.contains(index))
            .collect();
        open_tools.sort_unstable();

        for index in open_tools {
            self.close_tool_block(index, None, frames);
        }
    }

    fn on_terminal(&mut self, response: &ResponsesResult, frames: &mut Vec<StreamEvent>) {
        self.close_open_blocks(frames);

        let mut stop_reason = derive_stop_reason(response);
        if stop_reason == StopReason::EndTurn && self.saw_tool_call {
            stop_reason = StopReason::ToolUse;
        }

        self.usage = normalize_usage(response.usage.as_ref());
        self.emit_message_stop(stop_reason, frames);
    }

    fn emit_message_stop(&mut self, stop_reason: StopReason, frames: &mut Vec<StreamEvent>) {
        if self.message_stopped {
            return;
        }

        self.message_stopped = true;

        frames.push(StreamEvent::MessageDelta {
            delta: MessageDelta {
                stop_reason: Some(stop_reason),
                stop_sequence: None,
            },
            usage: self.usage,
        });
        frames.push(StreamEvent::MessageStop);
    }
}
