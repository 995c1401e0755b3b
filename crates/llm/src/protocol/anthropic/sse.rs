use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Message, ResponseContent, StopReason, Usage};

/// Server-sent event surface of the Messages streaming API.
///
/// Each serialized value maps to a concrete SSE `event:` name (for example
/// `message_start`, `content_block_delta`, or `ping`). Streams always begin with
/// a [`StreamEvent::MessageStart`], emit one or more content block lifecycles
/// (`content_block_start` → `content_block_delta*` → `content_block_stop`),
/// carry the stop reason and usage in a [`StreamEvent::MessageDelta`], and
/// finish with a terminal [`StreamEvent::MessageStop`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Announces the streamed message with an empty `content` array.
    MessageStart { message: Box<Message> },
    /// Starts a content block. The same `index` is used by its deltas and stop.
    ContentBlockStart { index: u32, content_block: ResponseContent },
    ContentBlockDelta { index: u32, delta: ContentDelta },
    ContentBlockStop { index: u32 },
    /// Top-level changes: stop reason and cumulative usage.
    MessageDelta { delta: MessageDelta, usage: Usage },
    MessageStop,
    Ping,
    #[serde(untagged)]
    Unknown(Value),
}

impl StreamEvent {
    /// The SSE `event:` name of this event.
    pub fn event_type(&self) -> &str {
        match self {
            Self::MessageStart { .. } => "message_start",
            Self::ContentBlockStart { .. } => "content_block_start",
            Self::ContentBlockDelta { .. } => "content_block_delta",
            Self::ContentBlockStop { .. } => "content_block_stop",
            Self::MessageDelta { .. } => "message_delta",
            Self::MessageStop => "message_stop",
            Self::Ping => "ping",
            Self::Unknown(value) => value.get("type").and_then(Value::as_str).unwrap_or("unknown"),
        }
    }
}

/// Incremental update of a content block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentDelta {
    TextDelta {
        text: String,
    },
    ThinkingDelta {
        thinking: String,
    },
    /// Sent right before the stop of a thinking block.
    SignatureDelta {
        signature: String,
    },
    /// Tool input JSON, possibly partial.
    InputJsonDelta {
        partial_json: String,
    },
    #[serde(untagged)]
    Unknown(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDelta {
    pub stop_reason: Option<StopReason>,
    pub stop_sequence: Option<String>,
}
