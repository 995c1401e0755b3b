//! Format-neutral messages, tools and generation options.
//!
//! Every input converter produces these types and every stream adapter consumes
//! [`UnifiedStreamEvent`]s, so the model-invocation backend only ever deals with
//! one representation:
//!
//! ```text
//! Vendor Request → ConvertedRequest → (backend) → UnifiedStreamEvent* → Vendor SSE
//! ```

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::schema::{SchemaViolation, ValidationSchema};

mod event;

pub use event::{FinishReason, UnifiedStreamEvent, UnifiedUsage, UpstreamError};

/// Role of a neutral message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnifiedRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A single conversation turn in the neutral representation.
///
/// Content is always a list of parts, even for plain text turns, so the backend
/// never has to distinguish between string and block content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedMessage {
    pub role: UnifiedRole,
    pub content: Vec<UnifiedPart>,
}

impl UnifiedMessage {
    pub fn new(role: UnifiedRole, content: Vec<UnifiedPart>) -> Self {
        Self { role, content }
    }

    /// A system message with a single text part.
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(UnifiedRole::System, vec![UnifiedPart::text(text)])
    }
}

/// Ordered content part of a neutral message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum UnifiedPart {
    Text {
        text: String,
    },
    Image {
        image: ImageData,
    },
    /// Opaque model "thinking". Signatures, redacted payloads and encrypted
    /// content travel in the provider options.
    Reasoning {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider_options: Option<ProviderOptions>,
    },
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        /// Parsed arguments, or `{"raw": "<original>"}` when the caller sent an
        /// argument string that is not valid JSON.
        input: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider_options: Option<ProviderOptions>,
    },
    ToolResult {
        tool_call_id: String,
        /// Resolved from the assistant tool calls of the same request.
        tool_name: String,
        output: ToolOutput,
        #[serde(default)]
        is_error: bool,
    },
}

impl UnifiedPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }

    /// Sort key for assistant turns: reasoning, then text and media, then tool calls.
    pub(crate) fn assistant_rank(&self) -> u8 {
        match self {
            Self::Reasoning { .. } => 0,
            Self::Text { .. } | Self::Image { .. } => 1,
            Self::ToolCall { .. } => 2,
            Self::ToolResult { .. } => 3,
        }
    }
}

/// Image payload, either a reference or inline data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum ImageData {
    Url { url: String },
    Base64 { media_type: String, data: String },
}

impl ImageData {
    /// Splits `data:<media>;base64,<payload>` URLs into inline data; anything
    /// else stays a URL reference.
    pub fn from_url(url: impl Into<String>) -> Self {
        let url = url.into();

        let inline = url.strip_prefix("data:").and_then(|rest| {
            let (header, data) = rest.split_once(',')?;
            let media_type = header.strip_suffix(";base64")?;

            Some((media_type.to_string(), data.to_string()))
        });

        match inline {
            Some((media_type, data)) => Self::Base64 { media_type, data },
            None => Self::Url { url },
        }
    }
}

/// Output of a tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "kebab-case")]
pub enum ToolOutput {
    Text(String),
    Json(Value),
    Content(Vec<ToolOutputContent>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ToolOutputContent {
    Text { text: String },
    Media { data: String, media_type: String },
}

/// Opaque per-provider options, keyed by provider identity (`anthropic`,
/// `google`, `openai`, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderOptions(Map<String, Value>);

impl ProviderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_provider(provider: impl Into<String>, options: Value) -> Self {
        let mut map = Map::new();
        map.insert(provider.into(), options);

        Self(map)
    }

    pub fn get(&self, provider: &str) -> Option<&Value> {
        self.0.get(provider)
    }

    pub fn insert(&mut self, provider: impl Into<String>, options: Value) {
        self.0.insert(provider.into(), options);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Interprets a JSON object as provider options. Non-objects and empty
    /// objects yield `None`.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) if !map.is_empty() => Some(Self(map)),
            _ => None,
        }
    }
}

/// Tool declaration in the neutral representation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnifiedTool {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Serialized as a JSON Schema with an explicit `properties` object on every
    /// object node.
    pub parameters: ValidationSchema,
}

impl UnifiedTool {
    pub fn new(name: impl Into<String>, description: Option<String>, parameters: &Value) -> Self {
        Self {
            name: name.into(),
            description,
            parameters: crate::schema::translate(parameters),
        }
    }
}

/// Sampling and length controls shared by every input format.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
}

/// Identity of the model provider a converted request is routed to.
///
/// Provider options are keyed by this identity, never by the input format.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Anthropic,
    Google,
    OpenAi,
    DeepSeek,
    Other(String),
}

impl ProviderKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Anthropic => "anthropic",
            Self::Google => "google",
            Self::OpenAi => "openai",
            Self::DeepSeek => "deepseek",
            Self::Other(name) => name,
        }
    }
}

impl FromStr for ProviderKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s.to_ascii_lowercase().as_str() {
            "anthropic" | "claude" => Self::Anthropic,
            "google" | "gemini" | "vertex" => Self::Google,
            "openai" | "azure" => Self::OpenAi,
            "deepseek" => Self::DeepSeek,
            other => Self::Other(other.to_string()),
        };

        Ok(kind)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of running one request body through a converter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertedRequest {
    pub messages: Vec<UnifiedMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<UnifiedTool>>,
    pub generation: GenerationOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_options: Option<ProviderOptions>,
}

/// A tool call whose input does not satisfy the declared tool schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentViolation {
    pub tool_call_id: String,
    pub tool_name: String,
    pub reason: String,
}

impl ConvertedRequest {
    /// Checks every assistant tool call against the declared tool of the same
    /// name. Calls to undeclared tools and unparseable (`raw`) inputs are
    /// reported as well.
    pub fn check_tool_calls(&self) -> Vec<ArgumentViolation> {
        let tools = self.tools.as_deref().unwrap_or_default();
        let mut violations = Vec::new();

        let calls = self.messages.iter().flat_map(|message| &message.content).filter_map(|part| match part {
            UnifiedPart::ToolCall {
                tool_call_id,
                tool_name,
                input,
                ..
            } => Some((tool_call_id, tool_name, input)),
            _ => None,
        });

        for (tool_call_id, tool_name, input) in calls {
            let reason = match tools.iter().find(|tool| &tool.name == tool_name) {
                None => Some(format!("tool '{tool_name}' is not declared")),
                Some(tool) => tool
                    .parameters
                    .validate(input)
                    .err()
                    .map(|SchemaViolation { path, reason }| format!("{path}: {reason}")),
            };

            if let Some(reason) = reason {
                violations.push(ArgumentViolation {
                    tool_call_id: tool_call_id.clone(),
                    tool_name: tool_name.clone(),
                    reason,
                });
            }
        }

        violations
    }
}
