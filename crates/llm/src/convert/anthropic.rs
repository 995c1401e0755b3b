use serde_json::json;

use crate::{
    protocol::anthropic::{
        ImageSource, InputContentBlock, InputMessage, InputMessageContent, Request, Role, SystemBlock, SystemPrompt,
        ThinkingConfig, ToolResultBlock, ToolResultContent,
    },
    unified::{
        GenerationOptions, ImageData, ProviderKind, ProviderOptions, ToolOutput, ToolOutputContent, UnifiedMessage,
        UnifiedPart, UnifiedRole, UnifiedTool,
    },
};

use super::{
    ConverterOptions, MessageBuilder, MessageConverter, ThinkingControl, ToolNameIndex, empty_parameters, join_text,
    map_thinking,
};

/// Converts Messages requests.
pub struct MessagesConverter {
    options: ConverterOptions,
}

impl MessagesConverter {
    pub fn new(options: ConverterOptions) -> Self {
        Self { options }
    }

    fn user_message(&self, builder: &mut MessageBuilder, tool_names: &ToolNameIndex, content: &InputMessageContent) {
        let blocks = match content {
            InputMessageContent::Text(text) => {
                builder.push(UnifiedRole::User, text_parts(text));
                return;
            }
            InputMessageContent::Blocks(blocks) => blocks,
        };

        let mut results = Vec::new();
        let mut parts = Vec::new();

        for block in blocks {
            match block {
                InputContentBlock::Text { text, .. } if text.is_empty() => {}
                InputContentBlock::Text { text, .. } => parts.push(UnifiedPart::text(text.as_str())),
                InputContentBlock::Image { source, .. } => parts.extend(image_part(source)),
                InputContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                    ..
                } => results.push(UnifiedPart::ToolResult {
                    tool_call_id: tool_use_id.clone(),
                    tool_name: tool_names.resolve(tool_use_id, &self.options.unknown_tool_name),
                    output: tool_output(content.as_ref()),
                    is_error: is_error.unwrap_or_default(),
                }),
                other => log::debug!("Dropping unsupported user content block: {other:?}"),
            }
        }

        // Results answer the previous assistant turn, so they come before
        // whatever the user wrote next to them.
        builder.push(UnifiedRole::Tool, results);
        builder.push(UnifiedRole::User, parts);
    }

    fn assistant_message(&self, builder: &mut MessageBuilder, content: &InputMessageContent) {
        let blocks = match content {
            InputMessageContent::Text(text) => {
                builder.push(UnifiedRole::Assistant, text_parts(text));
                return;
            }
            InputMessageContent::Blocks(blocks) => blocks,
        };

        let parts = blocks
            .iter()
            .filter_map(|block| match block {
                InputContentBlock::Text { text, .. } if text.is_empty() => None,
                InputContentBlock::Text { text, .. } => Some(UnifiedPart::text(text.as_str())),
                InputContentBlock::Image { source, .. } => image_part(source),
                InputContentBlock::Thinking { thinking, signature, .. } => Some(UnifiedPart::Reasoning {
                    text: thinking.clone(),
                    provider_options: signature
                        .as_ref()
                        .map(|signature| ProviderOptions::for_provider("anthropic", json!({ "signature": signature }))),
                }),
                InputContentBlock::RedactedThinking { data, .. } => Some(UnifiedPart::Reasoning {
                    text: String::new(),
                    provider_options: Some(ProviderOptions::for_provider(
                        "anthropic",
                        json!({ "redactedData": data }),
                    )),
                }),
                InputContentBlock::ToolUse { id, name, input, .. } => Some(UnifiedPart::ToolCall {
                    tool_call_id: id.clone(),
                    tool_name: name.clone(),
                    input: input.clone(),
                    provider_options: self.options.cached_provider_options(id),
                }),
                other => {
                    log::debug!("Dropping unsupported assistant content block: {other:?}");
                    None
                }
            })
            .collect();

        builder.push(UnifiedRole::Assistant, parts);
    }
}

fn text_parts(text: &str) -> Vec<UnifiedPart> {
    if text.is_empty() {
        Vec::new()
    } else {
        vec![UnifiedPart::text(text)]
    }
}

fn image_part(source: &ImageSource) -> Option<UnifiedPart> {
    let image = match source {
        ImageSource::Base64 { media_type, data } => ImageData::Base64 {
            media_type: media_type.clone(),
            data: data.clone(),
        },
        ImageSource::Url { url } => ImageData::Url { url: url.clone() },
        ImageSource::Unknown(value) => {
            log::debug!("Dropping image with unsupported source: {value}");
            return None;
        }
    };

    Some(UnifiedPart::Image { image })
}

fn tool_output(content: Option<&ToolResultContent>) -> ToolOutput {
    match content {
        None => ToolOutput::Text(String::new()),
        Some(ToolResultContent::Text(text)) => ToolOutput::Text(text.clone()),
        Some(ToolResultContent::Blocks(blocks)) => {
            let content = blocks
                .iter()
                .filter_map(|block| match block {
                    ToolResultBlock::Text { text } => Some(ToolOutputContent::Text { text: text.clone() }),
                    ToolResultBlock::Image {
                        source: ImageSource::Base64 { media_type, data },
                    } => Some(ToolOutputContent::Media {
                        data: data.clone(),
                        media_type: media_type.clone(),
                    }),
                    other => {
                        log::debug!("Dropping unsupported tool result block: {other:?}");
                        None
                    }
                })
                .collect();

            ToolOutput::Content(content)
        }
    }
}

fn system_text(system: &SystemPrompt) -> String {
    match system {
        SystemPrompt::Text(text) => text.clone(),
        SystemPrompt::Blocks(blocks) => join_text(blocks.iter().filter_map(|block| match block {
            SystemBlock::Text { text, .. } => Some(text.as_str()),
            SystemBlock::Unknown(_) => None,
        })),
    }
}

impl MessageConverter for MessagesConverter {
    type Request = Request;

    fn to_messages(&self, request: &Request) -> Vec<UnifiedMessage> {
        let mut tool_names = ToolNameIndex::default();

        for message in request.messages.iter().filter(|message| message.role == Role::Assistant) {
            let InputMessageContent::Blocks(blocks) = &message.content else {
                continue;
            };

            for block in blocks {
                if let InputContentBlock::ToolUse { id, name, .. } = block {
                    tool_names.insert(id, name);
                }
            }
        }

        let mut builder = MessageBuilder::default();

        if let Some(system) = &request.system {
            builder.system(system_text(system));
        }

        for InputMessage { role, content, .. } in &request.messages {
            match role {
                Role::User => self.user_message(&mut builder, &tool_names, content),
                Role::Assistant => self.assistant_message(&mut builder, content),
                Role::Unknown(role) => log::debug!("Dropping message with unsupported role '{role}'"),
            }
        }

        builder.finish()
    }

    fn to_tools(&self, request: &Request) -> Option<Vec<UnifiedTool>> {
        let tools = request.tools.as_ref()?;

        let tools: Vec<UnifiedTool> = tools
            .iter()
            .map(|tool| {
                if tool.is_builtin() && tool.input_schema.is_none() {
                    log::debug!("Tool '{}' is a built-in tool without a schema", tool.name);
                }

                let parameters = tool.input_schema.clone().unwrap_or_else(empty_parameters);

                UnifiedTool::new(tool.name.as_str(), tool.description.clone(), &parameters)
            })
            .collect();

        (!tools.is_empty()).then_some(tools)
    }

    fn extract_generation_options(&self, request: &Request) -> GenerationOptions {
        GenerationOptions {
            max_output_tokens: Some(request.max_tokens),
            temperature: request.temperature,
            top_p: request.top_p,
            top_k: request.top_k,
            stop_sequences: request.stop_sequences.clone(),
        }
    }

    fn extract_provider_options(&self, provider: &ProviderKind, request: &Request) -> Option<ProviderOptions> {
        let control = match request.thinking.as_ref()? {
            ThinkingConfig::Enabled { budget_tokens } => ThinkingControl::Enabled {
                budget_tokens: *budget_tokens,
            },
            ThinkingConfig::Disabled => ThinkingControl::Disabled,
            ThinkingConfig::Unknown(value) => {
                log::debug!("Ignoring unsupported thinking configuration: {value}");
                return None;
            }
        };

        map_thinking(provider, control, &self.options.reasoning_budgets)
    }
}
