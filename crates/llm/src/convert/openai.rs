use crate::{
    protocol::openai::{ChatCompletionRequest, ChatMessage, ContentPart, MessageContent, Tool},
    unified::{
        GenerationOptions, ImageData, ProviderKind, ProviderOptions, ToolOutput, UnifiedMessage, UnifiedPart,
        UnifiedRole, UnifiedTool,
    },
};

use super::{
    ConverterOptions, MessageBuilder, MessageConverter, ThinkingControl, ToolNameIndex, empty_parameters, join_text,
    map_thinking, parse_arguments,
};

/// Converts Chat Completions requests.
pub struct ChatCompletionsConverter {
    options: ConverterOptions,
}

impl ChatCompletionsConverter {
    pub fn new(options: ConverterOptions) -> Self {
        Self { options }
    }

    fn content_parts(&self, content: &MessageContent) -> Vec<UnifiedPart> {
        match content {
            MessageContent::Text(text) if text.is_empty() => Vec::new(),
            MessageContent::Text(text) => vec![UnifiedPart::text(text.as_str())],
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } if text.is_empty() => None,
                    ContentPart::Text { text } => Some(UnifiedPart::text(text.as_str())),
                    ContentPart::ImageUrl { image_url } => Some(UnifiedPart::Image {
                        image: ImageData::from_url(image_url.url.as_str()),
                    }),
                    ContentPart::Refusal { refusal } => Some(UnifiedPart::text(refusal.as_str())),
                    ContentPart::Unknown(value) => {
                        log::debug!("Dropping unsupported content part: {value}");
                        None
                    }
                })
                .collect(),
        }
    }
}

/// Plain text of a message, text parts joined with newlines.
fn content_text(content: &MessageContent) -> String {
    match content {
        MessageContent::Text(text) => text.clone(),
        MessageContent::Parts(parts) => join_text(parts.iter().filter_map(|part| match part {
            ContentPart::Text { text } => Some(text.as_str()),
            _ => None,
        })),
    }
}

impl MessageConverter for ChatCompletionsConverter {
    type Request = ChatCompletionRequest;

    fn to_messages(&self, request: &ChatCompletionRequest) -> Vec<UnifiedMessage> {
        let mut tool_names = ToolNameIndex::default();

        for message in &request.messages {
            if let ChatMessage::Assistant {
                tool_calls: Some(calls),
                ..
            } = message
            {
                for call in calls {
                    tool_names.insert(&call.id, &call.function.name);
                }
            }
        }

        let mut builder = MessageBuilder::default();

        for message in &request.messages {
            match message {
                ChatMessage::System { content } | ChatMessage::Developer { content } => {
                    builder.system(content_text(content));
                }
                ChatMessage::User { content } => {
                    builder.push(UnifiedRole::User, self.content_parts(content));
                }
                ChatMessage::Assistant {
                    content,
                    reasoning_content,
                    tool_calls,
                    refusal,
                } => {
                    let mut parts = Vec::new();

                    if let Some(reasoning) = reasoning_content.as_deref().filter(|r| !r.is_empty()) {
                        parts.push(UnifiedPart::Reasoning {
                            text: reasoning.to_string(),
                            provider_options: None,
                        });
                    }

                    if let Some(content) = content {
                        parts.extend(self.content_parts(content));
                    }

                    if let Some(refusal) = refusal.as_deref().filter(|r| !r.is_empty()) {
                        parts.push(UnifiedPart::text(refusal));
                    }

                    for call in tool_calls.iter().flatten() {
                        parts.push(UnifiedPart::ToolCall {
                            tool_call_id: call.id.clone(),
                            tool_name: call.function.name.clone(),
                            input: parse_arguments(&call.function.arguments),
                            provider_options: self.options.cached_provider_options(&call.id),
                        });
                    }

                    builder.push(UnifiedRole::Assistant, parts);
                }
                ChatMessage::Tool { tool_call_id, content } => {
                    let result = UnifiedPart::ToolResult {
                        tool_call_id: tool_call_id.clone(),
                        tool_name: tool_names.resolve(tool_call_id, &self.options.unknown_tool_name),
                        output: ToolOutput::Text(content_text(content)),
                        is_error: false,
                    };

                    builder.push(UnifiedRole::Tool, vec![result]);
                }
                ChatMessage::Unknown(value) => {
                    log::debug!("Dropping message with unsupported role: {value}");
                }
            }
        }

        builder.finish()
    }

    fn to_tools(&self, request: &ChatCompletionRequest) -> Option<Vec<UnifiedTool>> {
        let tools: Vec<UnifiedTool> = request
            .tools
            .as_ref()?
            .iter()
            .filter_map(|tool| match tool {
                Tool::Function { function } => {
                    let parameters = function.parameters.clone().unwrap_or_else(empty_parameters);

                    Some(UnifiedTool::new(
                        function.name.as_str(),
                        function.description.clone(),
                        &parameters,
                    ))
                }
                Tool::Unknown(value) => {
                    log::debug!("Skipping non-function tool: {value}");
                    None
                }
            })
            .collect();

        (!tools.is_empty()).then_some(tools)
    }

    fn extract_generation_options(&self, request: &ChatCompletionRequest) -> GenerationOptions {
        GenerationOptions {
            max_output_tokens: request.max_completion_tokens.or(request.max_tokens),
            temperature: request.temperature,
            top_p: request.top_p,
            top_k: None,
            stop_sequences: request.stop.clone().map(Vec::from),
        }
    }

    fn extract_provider_options(
        &self,
        provider: &ProviderKind,
        request: &ChatCompletionRequest,
    ) -> Option<ProviderOptions> {
        let control = ThinkingControl::effort(request.reasoning_effort.as_deref()?)?;

        map_thinking(provider, control, &self.options.reasoning_budgets)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use insta::assert_json_snapshot;
    use serde_json::json;

    use super::*;
    use crate::cache::{MokaReasoningCache, ReasoningCache};

    fn convert(body: serde_json::Value, provider: ProviderKind) -> crate::unified::ConvertedRequest {
        let request: ChatCompletionRequest = serde_json::from_value(body).unwrap();
        ChatCompletionsConverter::new(ConverterOptions::default()).convert(&provider, &request)
    }

    #[test]
    fn full_conversation() {
        let converted = convert(
            json!({
                "model": "gpt-4o",
                "messages": [
                    {"role": "system", "content": "You are terse."},
                    {"role": "developer", "content": [{"type": "text", "text": "Use metric units."}]},
                    {"role": "user", "content": [
                        {"type": "text", "text": "What is in this picture, and the weather?"},
                        {"type": "image_url", "image_url": {"url": "data:image/png;base64,AAAA"}},
                        {"type": "input_audio", "input_audio": {"data": "...", "format": "wav"}}
                    ]},
                    {"role": "assistant", "content": "Checking.", "reasoning_content": "Need the tool.", "tool_calls": [
                        {"id": "call_1", "type": "function", "function": {"name": "get_weather", "arguments": "{\"location\":\"SF\"}"}}
                    ]},
                    {"role": "tool", "tool_call_id": "call_1", "content": "18C"},
                    {"role": "tool", "tool_call_id": "call_9", "content": "orphan"}
                ],
                "max_tokens": 100,
                "max_completion_tokens": 200,
                "stop": "END"
            }),
            ProviderKind::OpenAi,
        );

        assert_json_snapshot!(serde_json::to_value(&converted).unwrap(), @r#"
        {
          "generation": {
            "maxOutputTokens": 200,
            "stopSequences": [
              "END"
            ]
          },
          "messages": [
            {
              "content": [
                {
                  "text": "You are terse.",
                  "type": "text"
                }
              ],
              "role": "system"
            },
            {
              "content": [
                {
                  "text": "Use metric units.",
                  "type": "text"
                }
              ],
              "role": "system"
            },
            {
              "content": [
                {
                  "text": "What is in this picture, and the weather?",
                  "type": "text"
                },
                {
                  "image": {
                    "data": "AAAA",
                    "kind": "base64",
                    "mediaType": "image/png"
                  },
                  "type": "image"
                }
              ],
              "role": "user"
            },
            {
              "content": [
                {
                  "text": "Need the tool.",
                  "type": "reasoning"
                },
                {
                  "text": "Checking.",
                  "type": "text"
                },
                {
                  "input": {
                    "location": "SF"
                  },
                  "toolCallId": "call_1",
                  "toolName": "get_weather",
                  "type": "tool-call"
                }
              ],
              "role": "assistant"
            },
            {
              "content": [
                {
                  "isError": false,
                  "output": {
                    "type": "text",
                    "value": "18C"
                  },
                  "toolCallId": "call_1",
                  "toolName": "get_weather",
                  "type": "tool-result"
                },
                {
                  "isError": false,
                  "output": {
                    "type": "text",
                    "value": "orphan"
                  },
                  "toolCallId": "call_9",
                  "toolName": "unknown_tool",
                  "type": "tool-result"
                }
              ],
              "role": "tool"
            }
          ]
        }
        "#);
    }

    #[test]
    fn only_function_tools_are_forwarded() {
        let converted = convert(
            json!({
                "model": "gpt-4o",
                "messages": [{"role": "user", "content": "hi"}],
                "tools": [
                    {"type": "function", "function": {"name": "noop"}},
                    {"type": "web_search_preview"}
                ]
            }),
            ProviderKind::OpenAi,
        );

        assert_json_snapshot!(serde_json::to_value(&converted.tools).unwrap(), @r#"
        [
          {
            "name": "noop",
            "parameters": {
              "properties": {},
              "type": "object"
            }
          }
        ]
        "#);
    }

    #[test]
    fn bad_arguments_and_empty_messages() {
        let converted = convert(
            json!({
                "model": "gpt-4o",
                "messages": [
                    {"role": "user", "content": ""},
                    {"role": "assistant", "content": null, "tool_calls": [
                        {"id": "call_1", "type": "function", "function": {"name": "run", "arguments": "{oops"}}
                    ]}
                ]
            }),
            ProviderKind::OpenAi,
        );

        assert_eq!(converted.messages.len(), 1);
        assert_json_snapshot!(serde_json::to_value(&converted.messages[0].content[0]).unwrap(), @r#"
        {
          "input": {
            "raw": "{oops"
          },
          "toolCallId": "call_1",
          "toolName": "run",
          "type": "tool-call"
        }
        "#);
    }

    #[test]
    fn reasoning_effort_follows_provider() {
        let body = json!({
            "model": "any",
            "messages": [{"role": "user", "content": "hi"}],
            "reasoning_effort": "low"
        });

        let anthropic = convert(body.clone(), ProviderKind::Anthropic).provider_options;
        let other = convert(body, ProviderKind::Other("mistral".to_string())).provider_options;

        assert_json_snapshot!(serde_json::to_value(&anthropic).unwrap(), @r#"
        {
          "anthropic": {
            "thinking": {
              "budgetTokens": 1024,
              "type": "enabled"
            }
          }
        }
        "#);
        assert_eq!(other, None);
    }

    #[test]
    fn cached_metadata_is_restored() {
        let cache = Arc::new(MokaReasoningCache::new(&config::CacheConfig::default()));
        cache.set("call_1".to_string(), json!({"anthropic": {"signature": "sig-1"}}));

        let options = ConverterOptions::default().with_cache(cache);

        let request: ChatCompletionRequest = serde_json::from_value(json!({
            "model": "any",
            "messages": [
                {"role": "assistant", "tool_calls": [
                    {"id": "call_1", "type": "function", "function": {"name": "run", "arguments": "{}"}}
                ]}
            ]
        }))
        .unwrap();

        let messages = ChatCompletionsConverter::new(options).to_messages(&request);

        let UnifiedPart::ToolCall { provider_options, .. } = &messages[0].content[0] else {
            unreachable!("expected a tool call");
        };

        assert_eq!(
            provider_options.clone().map(ProviderOptions::into_value),
            Some(json!({"anthropic": {"signature": "sig-1"}}))
        );
    }
}
