//! Output stream adapters.
//!
//! A [`StreamAdapter`] consumes neutral [`UnifiedStreamEvent`]s one at a time
//! and produces the events of a vendor streaming protocol. The block lifecycle,
//! token accounting and finish mapping live in [`AdapterState`] and are shared
//! by every output format; what goes on the wire is decided by a
//! [`WireProtocol`] strategy.

mod anthropic;
mod openai;
mod responses;

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

pub use anthropic::MessagesProtocol;
pub use openai::ChatCompletionsProtocol;
pub use responses::ResponsesProtocol;

use crate::{
    cache::ReasoningCache,
    protocol::{
        anthropic::{Message, StreamEvent},
        openai::{ChatCompletionChunk, ChatCompletionResponse},
        responses::{ResponseObject, ResponseStreamEvent},
    },
    unified::{FinishReason, ProviderOptions, UnifiedStreamEvent, UnifiedUsage, UpstreamError},
};

/// One event of a vendor streaming protocol.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum VendorEvent {
    Messages(StreamEvent),
    ChatCompletion(ChatCompletionChunk),
    Responses(ResponseStreamEvent),
    /// Events of formats registered at runtime.
    Custom(Value),
}

impl VendorEvent {
    /// Name of the event, used as the SSE `event:` field by formats that send one.
    pub fn event_type(&self) -> &str {
        match self {
            Self::Messages(event) => event.event_type(),
            Self::ChatCompletion(_) => "chat.completion.chunk",
            Self::Responses(event) => event.event_type(),
            Self::Custom(value) => value.get("type").and_then(Value::as_str).unwrap_or("message"),
        }
    }
}

impl From<StreamEvent> for VendorEvent {
    fn from(event: StreamEvent) -> Self {
        Self::Messages(event)
    }
}

impl From<ChatCompletionChunk> for VendorEvent {
    fn from(chunk: ChatCompletionChunk) -> Self {
        Self::ChatCompletion(chunk)
    }
}

impl From<ResponseStreamEvent> for VendorEvent {
    fn from(event: ResponseStreamEvent) -> Self {
        Self::Responses(event)
    }
}

/// A complete non-streaming response, assembled after the stream was drained.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AggregateResponse {
    Messages(Box<Message>),
    ChatCompletion(Box<ChatCompletionResponse>),
    Responses(Box<ResponseObject>),
    Custom(Value),
}

/// Neutral stop reason, rendered by each protocol in its own vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    ToolUse,
    Refusal,
}

impl From<FinishReason> for StopReason {
    fn from(reason: FinishReason) -> Self {
        match reason {
            FinishReason::Length => Self::MaxTokens,
            FinishReason::ToolCalls => Self::ToolUse,
            FinishReason::ContentFilter => Self::Refusal,
            FinishReason::Stop | FinishReason::Error | FinishReason::Other | FinishReason::Unknown => Self::EndTurn,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Text,
    Thinking,
    ToolUse,
}

/// Lifecycle and accumulated content of one output block.
#[derive(Debug, Clone)]
pub struct ContentBlockState {
    pub kind: BlockKind,
    pub index: u32,
    pub closed: bool,
    /// Text, thinking text or the serialized tool input.
    pub content: String,
    /// Tool call id and name of tool blocks.
    pub tool: Option<(String, String)>,
    pub provider_metadata: Option<ProviderOptions>,
}

impl ContentBlockState {
    fn new(kind: BlockKind, index: u32) -> Self {
        Self {
            kind,
            index,
            closed: false,
            content: String::new(),
            tool: None,
            provider_metadata: None,
        }
    }

    pub fn tool_call_id(&self) -> &str {
        self.tool.as_ref().map(|(id, _)| id.as_str()).unwrap_or_default()
    }

    pub fn tool_name(&self) -> &str {
        self.tool.as_ref().map(|(_, name)| name.as_str()).unwrap_or_default()
    }

    /// Reads a string from this block's metadata for `provider`.
    pub fn metadata_str(&self, provider: &str, key: &str) -> Option<&str> {
        self.provider_metadata.as_ref()?.get(provider)?.get(key)?.as_str()
    }

    fn merge_metadata(&mut self, metadata: Option<&ProviderOptions>) {
        let Some(metadata) = metadata else {
            return;
        };

        let merged = self.provider_metadata.get_or_insert_with(ProviderOptions::new);

        for (provider, options) in metadata.iter() {
            let value = match (merged.get(provider), options) {
                (Some(Value::Object(existing)), Value::Object(update)) => {
                    let mut existing = existing.clone();
                    existing.extend(update.clone());
                    Value::Object(existing)
                }
                _ => options.clone(),
            };

            merged.insert(provider.as_str(), value);
        }
    }
}

/// Running token counters. Only counters reported by the backend are updated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenCounts {
    pub input: u32,
    pub output: u32,
    pub cached_input: u32,
    pub reasoning: u32,
}

impl TokenCounts {
    fn update(&mut self, usage: &UnifiedUsage) {
        if let Some(input) = usage.input_tokens {
            self.input = input;
        }

        if let Some(output) = usage.output_tokens {
            self.output = output;
        }

        if let Some(cached) = usage.cached_input_tokens {
            self.cached_input = cached;
        }

        if let Some(reasoning) = usage.reasoning_tokens {
            self.reasoning = reasoning;
        }
    }

    pub fn total(&self) -> u32 {
        self.input.saturating_add(self.output)
    }
}

/// State of one streamed response.
#[derive(Debug)]
pub struct AdapterState {
    pub message_id: String,
    pub model: String,
    /// Unix timestamp in seconds.
    pub created: i64,
    pub usage: TokenCounts,
    pub blocks: BTreeMap<u32, ContentBlockState>,
    pub stop_reason: Option<StopReason>,
    next_index: u32,
    /// Open reasoning streams in the order they were first seen.
    reasoning: IndexMap<String, u32>,
    tools: HashMap<String, u32>,
    text_block: Option<u32>,
    opened: bool,
    finalized: bool,
    failed: bool,
}

impl AdapterState {
    fn new(message_id: String, model: String, created: i64) -> Self {
        Self {
            message_id,
            model,
            created,
            usage: TokenCounts::default(),
            blocks: BTreeMap::new(),
            stop_reason: None,
            next_index: 0,
            reasoning: IndexMap::new(),
            tools: HashMap::new(),
            text_block: None,
            opened: false,
            finalized: false,
            failed: false,
        }
    }

    /// The stop reason reported at the end of the stream.
    pub fn final_stop_reason(&self) -> StopReason {
        self.stop_reason.unwrap_or(StopReason::EndTurn)
    }

    /// Blocks of one kind, in index order.
    pub fn blocks_of(&self, kind: BlockKind) -> impl Iterator<Item = &ContentBlockState> {
        self.blocks.values().filter(move |block| block.kind == kind)
    }

    fn open_block(&mut self, kind: BlockKind) -> u32 {
        let index = self.next_index;
        self.next_index += 1;

        self.blocks.insert(index, ContentBlockState::new(kind, index));

        index
    }
}

/// Wire format of one output protocol.
///
/// The adapter drives the block lifecycle and calls these hooks; every hook
/// appends the vendor events it needs to `out`. Hooks see the state after the
/// change they are notified about.
pub trait WireProtocol: Send {
    /// Prefix of generated message ids.
    fn id_prefix(&self) -> &str;

    fn opening(&mut self, state: &AdapterState, out: &mut Vec<VendorEvent>);

    fn block_opened(&mut self, state: &AdapterState, block: &ContentBlockState, out: &mut Vec<VendorEvent>);

    fn block_delta(
        &mut self,
        state: &AdapterState,
        block: &ContentBlockState,
        delta: &str,
        out: &mut Vec<VendorEvent>,
    );

    fn block_closed(&mut self, state: &AdapterState, block: &ContentBlockState, out: &mut Vec<VendorEvent>);

    /// Terminal events, after every block was closed.
    fn closing(&mut self, state: &AdapterState, out: &mut Vec<VendorEvent>);

    fn aggregate(&self, state: &AdapterState) -> AggregateResponse;
}

/// Per-response settings of a [`StreamAdapter`].
#[derive(Clone, Default)]
pub struct AdapterOptions {
    pub model: String,
    /// Generated from the protocol prefix and a random UUID when not set.
    pub message_id: Option<String>,
    /// Defaults to the current time.
    pub created: Option<i64>,
    /// Receives the provider metadata of every emitted tool call.
    pub cache: Option<Arc<dyn ReasoningCache>>,
}

impl AdapterOptions {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn ReasoningCache>) -> Self {
        self.cache = Some(cache);
        self
    }
}

/// Turns a neutral event stream into the events of one output protocol.
///
/// One adapter serves exactly one response. `consume` must be called for
/// every neutral event in order, followed by a single `finalize`.
pub struct StreamAdapter {
    state: AdapterState,
    protocol: Box<dyn WireProtocol>,
    cache: Option<Arc<dyn ReasoningCache>>,
}

impl StreamAdapter {
    pub fn new(protocol: Box<dyn WireProtocol>, options: AdapterOptions) -> Self {
        let AdapterOptions {
            model,
            message_id,
            created,
            cache,
        } = options;

        let message_id =
            message_id.unwrap_or_else(|| format!("{}{}", protocol.id_prefix(), Uuid::new_v4().simple()));

        let created = created.unwrap_or_else(|| jiff::Timestamp::now().as_second());

        Self {
            state: AdapterState::new(message_id, model, created),
            protocol,
            cache,
        }
    }

    pub fn state(&self) -> &AdapterState {
        &self.state
    }

    /// Emits the connection events. Only the first call produces events.
    pub fn emit_opening(&mut self) -> Vec<VendorEvent> {
        let mut out = Vec::new();
        self.open(&mut out);
        out
    }

    /// Handles one neutral event.
    ///
    /// An `error` event is returned as is and stops the adapter: later
    /// events, including `finalize`, produce nothing.
    pub fn consume(&mut self, event: UnifiedStreamEvent) -> Result<Vec<VendorEvent>, UpstreamError> {
        let mut out = Vec::new();

        if self.state.failed || self.state.finalized {
            log::debug!("Ignoring stream event after the stream ended: {event:?}");
            return Ok(out);
        }

        if let UnifiedStreamEvent::Error { error } = event {
            log::warn!("Upstream stream failed: {error}");
            self.state.failed = true;
            return Err(error);
        }

        self.open(&mut out);
        self.apply(event, &mut out);

        Ok(out)
    }

    fn apply(&mut self, event: UnifiedStreamEvent, out: &mut Vec<VendorEvent>) {
        match event {
            UnifiedStreamEvent::TextStart { .. } => {
                if self.state.text_block.is_none() {
                    self.open_text(out);
                }
            }
            UnifiedStreamEvent::TextDelta { text, .. } => {
                if !text.is_empty() {
                    let index = match self.state.text_block {
                        Some(index) => index,
                        None => self.open_text(out),
                    };

                    self.delta(index, &text, out);
                }
            }
            UnifiedStreamEvent::TextEnd { .. } => self.close_text(out),
            UnifiedStreamEvent::ReasoningStart { id, provider_metadata } => {
                self.reasoning_block(&id, provider_metadata.as_ref(), out);
            }
            UnifiedStreamEvent::ReasoningDelta {
                id,
                text,
                provider_metadata,
            } => {
                let index = self.reasoning_block(&id, provider_metadata.as_ref(), out);

                if !text.is_empty() {
                    self.delta(index, &text, out);
                }
            }
            UnifiedStreamEvent::ReasoningEnd { id, provider_metadata } => match self.state.reasoning.shift_remove(&id) {
                Some(index) => {
                    if let Some(block) = self.state.blocks.get_mut(&index) {
                        block.merge_metadata(provider_metadata.as_ref());
                    }

                    self.close(index, out);
                }
                None => log::debug!("Ignoring end of unknown reasoning stream '{id}'"),
            },
            UnifiedStreamEvent::ToolCall {
                tool_call_id,
                tool_name,
                input,
                provider_metadata,
            } => self.tool_call(tool_call_id, tool_name, input, provider_metadata, out),
            UnifiedStreamEvent::FinishStep { finish_reason, .. } => {
                if finish_reason == FinishReason::ToolCalls && self.state.stop_reason.is_none() {
                    self.state.stop_reason = Some(StopReason::ToolUse);
                }
            }
            UnifiedStreamEvent::Finish {
                finish_reason,
                total_usage,
            } => {
                if let Some(usage) = total_usage {
                    self.state.usage.update(&usage);
                }

                self.state.stop_reason.get_or_insert(StopReason::from(finish_reason));
            }
            UnifiedStreamEvent::ToolResult { .. } | UnifiedStreamEvent::Error { .. } | UnifiedStreamEvent::Unknown => {}
        }
    }

    /// Closes every open block and emits the terminal events. Only the first
    /// call produces events, and none are produced after an error.
    pub fn finalize(&mut self) -> Vec<VendorEvent> {
        let mut out = Vec::new();

        if self.state.failed || self.state.finalized {
            return out;
        }

        self.open(&mut out);
        self.close_text(&mut out);

        let reasoning: Vec<u32> = self.state.reasoning.drain(..).map(|(_, index)| index).collect();

        for index in reasoning {
            self.close(index, &mut out);
        }

        self.state.finalized = true;
        self.protocol.closing(&self.state, &mut out);

        out
    }

    /// The complete response, in block order.
    pub fn build_aggregate_response(&self) -> AggregateResponse {
        self.protocol.aggregate(&self.state)
    }

    fn open(&mut self, out: &mut Vec<VendorEvent>) {
        if !self.state.opened {
            self.state.opened = true;
            self.protocol.opening(&self.state, out);
        }
    }

    fn open_block(&mut self, kind: BlockKind, out: &mut Vec<VendorEvent>) -> u32 {
        let index = self.state.open_block(kind);
        self.notify_opened(index, out);
        index
    }

    fn notify_opened(&mut self, index: u32, out: &mut Vec<VendorEvent>) {
        if let Some(block) = self.state.blocks.get(&index) {
            self.protocol.block_opened(&self.state, block, out);
        }
    }

    fn open_text(&mut self, out: &mut Vec<VendorEvent>) -> u32 {
        let index = self.open_block(BlockKind::Text, out);
        self.state.text_block = Some(index);
        index
    }

    fn close_text(&mut self, out: &mut Vec<VendorEvent>) {
        if let Some(index) = self.state.text_block.take() {
            self.close(index, out);
        }
    }

    fn reasoning_block(&mut self, id: &str, metadata: Option<&ProviderOptions>, out: &mut Vec<VendorEvent>) -> u32 {
        if let Some(index) = self.state.reasoning.get(id).copied() {
            if let Some(block) = self.state.blocks.get_mut(&index) {
                block.merge_metadata(metadata);
            }

            return index;
        }

        let index = self.state.open_block(BlockKind::Thinking);
        self.state.reasoning.insert(id.to_string(), index);

        if let Some(block) = self.state.blocks.get_mut(&index) {
            block.merge_metadata(metadata);
        }

        self.notify_opened(index, out);

        index
    }

    fn tool_call(
        &mut self,
        tool_call_id: String,
        tool_name: String,
        input: Value,
        metadata: Option<ProviderOptions>,
        out: &mut Vec<VendorEvent>,
    ) {
        if self.state.tools.contains_key(&tool_call_id) {
            log::debug!("Ignoring duplicate tool call '{tool_call_id}'");
            return;
        }

        if let (Some(cache), Some(metadata)) = (&self.cache, &metadata) {
            cache.set(tool_call_id.clone(), metadata.clone().into_value());
        }

        let arguments = match input {
            Value::String(arguments) => arguments,
            input => input.to_string(),
        };

        let index = self.state.open_block(BlockKind::ToolUse);
        self.state.tools.insert(tool_call_id.clone(), index);

        if let Some(block) = self.state.blocks.get_mut(&index) {
            block.tool = Some((tool_call_id, tool_name));
            block.provider_metadata = metadata;
        }

        self.state.stop_reason = Some(StopReason::ToolUse);

        self.notify_opened(index, out);
        self.delta(index, &arguments, out);
        self.close(index, out);
    }

    fn delta(&mut self, index: u32, delta: &str, out: &mut Vec<VendorEvent>) {
        if let Some(block) = self.state.blocks.get_mut(&index) {
            block.content.push_str(delta);
        }

        if let Some(block) = self.state.blocks.get(&index) {
            self.protocol.block_delta(&self.state, block, delta, out);
        }
    }

    fn close(&mut self, index: u32, out: &mut Vec<VendorEvent>) {
        match self.state.blocks.get_mut(&index) {
            Some(block) if !block.closed => block.closed = true,
            _ => return,
        }

        if let Some(block) = self.state.blocks.get(&index) {
            self.protocol.block_closed(&self.state, block, out);
        }
    }
}
