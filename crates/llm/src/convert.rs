//! Request conversion from the vendor formats into the neutral representation.

mod anthropic;
mod openai;
mod provider_options;
mod responses;

use std::{collections::HashMap, sync::Arc};

use config::{ConversionConfig, ReasoningBudgets};
use serde::de::DeserializeOwned;
use serde_json::Value;
use strum::{Display, EnumString, IntoStaticStr, VariantNames};

pub use anthropic::MessagesConverter;
pub use openai::ChatCompletionsConverter;
pub use provider_options::{ReasoningEffort, ThinkingControl, map_thinking};
pub use responses::ResponsesConverter;

use crate::{
    cache::ReasoningCache,
    error::{LlmError, Result},
    unified::{
        ConvertedRequest, GenerationOptions, ProviderKind, ProviderOptions, UnifiedMessage, UnifiedPart, UnifiedRole,
        UnifiedTool,
    },
};

/// Input format tags accepted by [`ConverterFactory::create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, IntoStaticStr, VariantNames)]
pub enum InputFormat {
    /// Chat Completions.
    #[strum(serialize = "openai")]
    OpenAi,
    /// Messages.
    #[strum(serialize = "anthropic")]
    Anthropic,
    /// Responses.
    #[strum(serialize = "openai-responses")]
    OpenAiResponses,
}

/// Settings shared by every converter.
#[derive(Clone)]
pub struct ConverterOptions {
    /// Name given to tool results whose call id matches no tool call.
    pub unknown_tool_name: String,
    pub reasoning_budgets: ReasoningBudgets,
    /// Restores provider metadata of tool calls by call id.
    pub cache: Option<Arc<dyn ReasoningCache>>,
}

impl Default for ConverterOptions {
    fn default() -> Self {
        Self::from(&ConversionConfig::default())
    }
}

impl From<&ConversionConfig> for ConverterOptions {
    fn from(config: &ConversionConfig) -> Self {
        Self {
            unknown_tool_name: config.unknown_tool_name.clone(),
            reasoning_budgets: config.reasoning_budgets,
            cache: None,
        }
    }
}

impl ConverterOptions {
    pub fn with_cache(mut self, cache: Arc<dyn ReasoningCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Provider metadata previously stored for a tool call.
    pub(crate) fn cached_provider_options(&self, tool_call_id: &str) -> Option<ProviderOptions> {
        let cached = self.cache.as_ref()?.get(tool_call_id)?;

        log::debug!("Restored provider metadata for tool call '{tool_call_id}'");

        ProviderOptions::from_value(cached)
    }
}

/// Converts one vendor request format into the neutral representation.
pub trait MessageConverter {
    type Request: DeserializeOwned;

    fn to_messages(&self, request: &Self::Request) -> Vec<UnifiedMessage>;

    fn to_tools(&self, request: &Self::Request) -> Option<Vec<UnifiedTool>>;

    fn extract_generation_options(&self, request: &Self::Request) -> GenerationOptions;

    /// Maps the format's reasoning control onto the target provider's control.
    fn extract_provider_options(&self, provider: &ProviderKind, request: &Self::Request) -> Option<ProviderOptions>;

    fn convert(&self, provider: &ProviderKind, request: &Self::Request) -> ConvertedRequest {
        ConvertedRequest {
            messages: self.to_messages(request),
            tools: self.to_tools(request),
            generation: self.extract_generation_options(request),
            provider_options: self.extract_provider_options(provider, request),
        }
    }
}

/// Dispatches input format tags to converters.
pub struct ConverterFactory;

impl ConverterFactory {
    pub fn create(format: &str, options: ConverterOptions) -> Result<AnyConverter> {
        let format: InputFormat = format.parse().map_err(|_| LlmError::UnsupportedFormat {
            format: format.to_string(),
            supported: Self::supported_formats(),
        })?;

        let converter = match format {
            InputFormat::OpenAi => AnyConverter::ChatCompletions(ChatCompletionsConverter::new(options)),
            InputFormat::Anthropic => AnyConverter::Messages(MessagesConverter::new(options)),
            InputFormat::OpenAiResponses => AnyConverter::Responses(ResponsesConverter::new(options)),
        };

        Ok(converter)
    }

    pub fn supported_formats() -> Vec<String> {
        InputFormat::VARIANTS.iter().map(|format| format.to_string()).collect()
    }
}

/// A converter for any of the built-in input formats, working on untyped bodies.
pub enum AnyConverter {
    ChatCompletions(ChatCompletionsConverter),
    Messages(MessagesConverter),
    Responses(ResponsesConverter),
}

impl AnyConverter {
    pub fn format(&self) -> InputFormat {
        match self {
            Self::ChatCompletions(_) => InputFormat::OpenAi,
            Self::Messages(_) => InputFormat::Anthropic,
            Self::Responses(_) => InputFormat::OpenAiResponses,
        }
    }

    /// Parses a raw request body and converts it.
    pub fn convert_str(&self, body: &str, provider: &ProviderKind) -> Result<ConvertedRequest> {
        match self {
            Self::ChatCompletions(converter) => convert_with(converter, sonic_rs::from_str(body), provider),
            Self::Messages(converter) => convert_with(converter, sonic_rs::from_str(body), provider),
            Self::Responses(converter) => convert_with(converter, sonic_rs::from_str(body), provider),
        }
    }

    /// Converts an already parsed request body.
    pub fn convert_value(&self, body: Value, provider: &ProviderKind) -> Result<ConvertedRequest> {
        match self {
            Self::ChatCompletions(converter) => convert_with(converter, serde_json::from_value(body), provider),
            Self::Messages(converter) => convert_with(converter, serde_json::from_value(body), provider),
            Self::Responses(converter) => convert_with(converter, serde_json::from_value(body), provider),
        }
    }
}

fn convert_with<C, E>(
    converter: &C,
    request: std::result::Result<C::Request, E>,
    provider: &ProviderKind,
) -> Result<ConvertedRequest>
where
    C: MessageConverter,
    E: std::fmt::Display,
{
    let request = request.map_err(|e| LlmError::InvalidRequest(e.to_string()))?;

    Ok(converter.convert(provider, &request))
}

/// Request-scoped map from tool call id to tool name, filled from every
/// assistant tool call before any tool result is resolved.
#[derive(Debug, Default)]
pub(crate) struct ToolNameIndex {
    names: HashMap<String, String>,
}

impl ToolNameIndex {
    pub(crate) fn insert(&mut self, id: &str, name: &str) {
        self.names.insert(id.to_string(), name.to_string());
    }

    pub(crate) fn resolve(&self, id: &str, sentinel: &str) -> String {
        match self.names.get(id) {
            Some(name) => name.clone(),
            None => {
                log::debug!("Tool result '{id}' matches no tool call, using '{sentinel}'");
                sentinel.to_string()
            }
        }
    }
}

/// Groups converted parts into messages.
#[derive(Debug, Default)]
pub(crate) struct MessageBuilder {
    messages: Vec<UnifiedMessage>,
}

impl MessageBuilder {
    pub(crate) fn system(&mut self, text: String) {
        if !text.is_empty() {
            self.push(UnifiedRole::System, vec![UnifiedPart::Text { text }]);
        }
    }

    /// Appends a message. Empty messages are skipped, assistant parts are put
    /// in reasoning, text, tool call order and consecutive tool messages merge.
    pub(crate) fn push(&mut self, role: UnifiedRole, mut parts: Vec<UnifiedPart>) {
        if parts.is_empty() {
            return;
        }

        if role == UnifiedRole::Assistant {
            parts.sort_by_key(UnifiedPart::assistant_rank);
        }

        match self.messages.last_mut() {
            Some(last) if role == UnifiedRole::Tool && last.role == UnifiedRole::Tool => last.content.extend(parts),
            _ => self.messages.push(UnifiedMessage::new(role, parts)),
        }
    }

    pub(crate) fn finish(self) -> Vec<UnifiedMessage> {
        self.messages
    }
}

/// Parses tool call arguments. Anything that is not valid JSON is kept as
/// `{"raw": "<original>"}`; an empty string means no arguments.
pub(crate) fn parse_arguments(arguments: &str) -> Value {
    if arguments.trim().is_empty() {
        return Value::Object(Default::default());
    }

    match serde_json::from_str(arguments) {
        Ok(value) => value,
        Err(err) => {
            log::debug!("Keeping unparseable tool arguments as raw text: {err}");
            serde_json::json!({ "raw": arguments })
        }
    }
}

/// Joins text fragments with newlines, skipping empty ones.
pub(crate) fn join_text<'a>(fragments: impl IntoIterator<Item = &'a str>) -> String {
    fragments
        .into_iter()
        .filter(|fragment| !fragment.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parameter schema of a tool that declares none.
pub(crate) fn empty_parameters() -> Value {
    serde_json::json!({ "type": "object" })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn unsupported_formats_are_rejected() {
        let Err(error) = ConverterFactory::create("gemini", ConverterOptions::default()) else {
            unreachable!("gemini is not an input format");
        };

        insta::assert_snapshot!(error, @"Unsupported format 'gemini', supported formats: openai, anthropic, openai-responses");
    }

    #[test]
    fn factory_dispatches_by_tag() {
        for (tag, format) in [
            ("openai", InputFormat::OpenAi),
            ("anthropic", InputFormat::Anthropic),
            ("openai-responses", InputFormat::OpenAiResponses),
        ] {
            let converter = ConverterFactory::create(tag, ConverterOptions::default()).unwrap();
            assert_eq!(converter.format(), format);
        }
    }

    #[test]
    fn malformed_bodies_are_invalid_requests() {
        let converter = ConverterFactory::create("anthropic", ConverterOptions::default()).unwrap();

        let error = converter
            .convert_value(json!({"model": "claude"}), &ProviderKind::Anthropic)
            .unwrap_err();

        assert!(matches!(error, LlmError::InvalidRequest(_)));

        let error = converter.convert_str("{not json", &ProviderKind::Anthropic).unwrap_err();
        assert!(matches!(error, LlmError::InvalidRequest(_)));
    }

    #[test]
    fn arguments_parse_or_stay_raw() {
        assert_eq!(parse_arguments(r#"{"location":"SF"}"#), json!({"location": "SF"}));
        assert_eq!(parse_arguments(""), json!({}));
        assert_eq!(parse_arguments("{\"location\":"), json!({"raw": "{\"location\":"}));
    }

    #[test]
    fn consecutive_tool_messages_merge() {
        let mut builder = MessageBuilder::default();

        let result = |id: &str| UnifiedPart::ToolResult {
            tool_call_id: id.to_string(),
            tool_name: "lookup".to_string(),
            output: crate::unified::ToolOutput::Text("ok".to_string()),
            is_error: false,
        };

        builder.push(UnifiedRole::Tool, vec![result("a")]);
        builder.push(UnifiedRole::Tool, vec![result("b")]);
        builder.push(UnifiedRole::User, vec![]);

        let messages = builder.finish();

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content.len(), 2);
    }
}
