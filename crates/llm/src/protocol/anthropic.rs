//! Wire types of the Messages API.

mod input;
mod request;
mod response;
mod sse;

pub use input::*;
pub use request::*;
pub use response::*;
pub use sse::*;

use serde::{Deserialize, Serialize};

use crate::protocol::unknown_fields::UnknownFields;

/// Supported Messages API roles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    #[serde(untagged)]
    Unknown(String),
}

/// Reasons a message stopped generating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
    ToolUse,
    PauseTurn,
    Refusal,
    #[serde(untagged)]
    Unknown(String),
}

/// Token usage reported on `message_start`, `message_delta` and complete
/// message bodies. Counters in `message_delta` are cumulative.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,

    /// Input tokens served from the prompt cache.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read_input_tokens: Option<u32>,

    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}
