use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::unknown_fields::UnknownFields;

use super::InputMessage;

/// Request body for the Messages API.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Request {
    /// The model that will complete the prompt.
    pub model: String,
    /// Conversation turns.
    pub messages: Vec<InputMessage>,
    /// Maximum output tokens the model may generate.
    pub max_tokens: u32,

    /// System prompt providing global instructions for the assistant.
    #[serde(default)]
    pub system: Option<SystemPrompt>,

    #[serde(default)]
    pub temperature: Option<f32>,

    #[serde(default)]
    pub top_p: Option<f32>,

    #[serde(default)]
    pub top_k: Option<u32>,

    /// Custom strings that cause generation to stop when produced.
    #[serde(default)]
    pub stop_sequences: Option<Vec<String>>,

    /// When true, deliver a Server-Sent Events stream instead of a single body.
    #[serde(default)]
    pub stream: Option<bool>,

    /// Tool specifications the model may call during this request.
    #[serde(default)]
    pub tools: Option<Vec<Tool>>,

    #[serde(default)]
    pub tool_choice: Option<Value>,

    /// Extended thinking configuration.
    #[serde(default)]
    pub thinking: Option<ThinkingConfig>,

    /// Additional undocumented fields preserved for forward compatibility.
    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

/// System prompt payload accepted by the Messages API.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SystemPrompt {
    /// Plain-text system prompt.
    Text(String),
    /// Structured system prompt comprised of content blocks.
    Blocks(Vec<SystemBlock>),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SystemBlock {
    Text {
        text: String,
        #[serde(flatten)]
        unknown_fields: UnknownFields,
    },
    #[serde(untagged)]
    Unknown(Value),
}

/// Configuration for extended thinking.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ThinkingConfig {
    Enabled {
        /// Token budget the model may spend thinking.
        budget_tokens: u32,
    },
    Disabled,
    #[serde(untagged)]
    Unknown(Value),
}

/// Tool definition. Custom tools carry an `input_schema`; versioned built-in
/// tools (`bash_20250124`, `text_editor_20250728`, ...) only carry their type
/// and name.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Tool {
    /// Unique tool name surfaced to the model and in tool_use blocks.
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Tool category, `custom` when omitted.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,

    /// JSON Schema describing the tool's expected input payload.
    #[serde(default)]
    pub input_schema: Option<Value>,

    /// Additional tool fields forwarded unchanged.
    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

impl Tool {
    /// Whether this is one of the provider-defined tool variants.
    pub fn is_builtin(&self) -> bool {
        self.kind.as_deref().is_some_and(|kind| kind != "custom")
    }
}
