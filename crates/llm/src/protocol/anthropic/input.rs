use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::unknown_fields::UnknownFields;

use super::Role;

/// A single input message.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InputMessage {
    /// Originating role for the message turn.
    pub role: Role,
    /// Message body provided as text or structured blocks.
    pub content: InputMessageContent,

    /// Extra message fields passed through untouched.
    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

/// Message content may be provided as a raw string or as structured content blocks.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum InputMessageContent {
    Text(String),
    Blocks(Vec<InputContentBlock>),
}

/// Structured content blocks accepted in request messages.
///
/// Server tool blocks, documents, search results and anything newer land in
/// [`InputContentBlock::Unknown`] and are dropped during conversion.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputContentBlock {
    Text {
        text: String,
        #[serde(flatten)]
        unknown_fields: UnknownFields,
    },
    Image {
        source: ImageSource,
        #[serde(flatten)]
        unknown_fields: UnknownFields,
    },
    Thinking {
        thinking: String,
        /// Signature verifying the thinking payload.
        #[serde(default)]
        signature: Option<String>,
        #[serde(flatten)]
        unknown_fields: UnknownFields,
    },
    RedactedThinking {
        /// Opaque encrypted thinking payload.
        data: String,
        #[serde(flatten)]
        unknown_fields: UnknownFields,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
        #[serde(flatten)]
        unknown_fields: UnknownFields,
    },
    ToolResult {
        /// Identifier of the tool use this result corresponds to.
        tool_use_id: String,
        #[serde(default)]
        content: Option<ToolResultContent>,
        #[serde(default)]
        is_error: Option<bool>,
        #[serde(flatten)]
        unknown_fields: UnknownFields,
    },
    #[serde(untagged)]
    Unknown(Value),
}

/// Image source descriptor.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImageSource {
    Base64 { media_type: String, data: String },
    Url { url: String },
    #[serde(untagged)]
    Unknown(Value),
}

/// Tool output, either a string or a list of blocks.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ToolResultContent {
    Text(String),
    Blocks(Vec<ToolResultBlock>),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolResultBlock {
    Text {
        text: String,
    },
    Image {
        source: ImageSource,
    },
    #[serde(untagged)]
    Unknown(Value),
}
