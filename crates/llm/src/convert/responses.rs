use serde_json::{Map, Value};

use crate::{
    protocol::responses::{
        FunctionCallOutput, InputContentPart, InputItem, InputMessage, InputMessageContent, InputRole, ResponsesInput,
        ResponsesRequest, ResponsesTool, SummaryPart,
    },
    unified::{
        GenerationOptions, ImageData, ProviderKind, ProviderOptions, ToolOutput, UnifiedMessage, UnifiedPart,
        UnifiedRole, UnifiedTool,
    },
};

use super::{
    ConverterOptions, MessageBuilder, MessageConverter, ThinkingControl, ToolNameIndex, empty_parameters, join_text,
    map_thinking, parse_arguments,
};

/// Converts Responses requests.
///
/// Assistant messages, function calls and reasoning items that follow each
/// other form a single assistant turn.
pub struct ResponsesConverter {
    options: ConverterOptions,
}

impl ResponsesConverter {
    pub fn new(options: ConverterOptions) -> Self {
        Self { options }
    }

    fn reasoning_part(
        &self,
        id: Option<&str>,
        summary: &[SummaryPart],
        encrypted_content: Option<&str>,
    ) -> Option<UnifiedPart> {
        let text = join_text(summary.iter().map(|SummaryPart::SummaryText { text }| text.as_str()));

        let mut openai = Map::new();

        if let Some(id) = id {
            openai.insert("itemId".to_string(), Value::from(id));
        }

        if let Some(encrypted_content) = encrypted_content {
            openai.insert("reasoningEncryptedContent".to_string(), Value::from(encrypted_content));
        }

        if text.is_empty() && openai.is_empty() {
            return None;
        }

        let provider_options =
            (!openai.is_empty()).then(|| ProviderOptions::for_provider("openai", Value::Object(openai)));

        Some(UnifiedPart::Reasoning { text, provider_options })
    }
}

fn content_parts(content: &InputMessageContent) -> Vec<UnifiedPart> {
    match content {
        InputMessageContent::Text(text) if text.is_empty() => Vec::new(),
        InputMessageContent::Text(text) => vec![UnifiedPart::text(text.as_str())],
        InputMessageContent::Parts(parts) => parts.iter().filter_map(content_part).collect(),
    }
}

fn content_part(part: &InputContentPart) -> Option<UnifiedPart> {
    match part {
        InputContentPart::InputText { text } | InputContentPart::OutputText { text } if text.is_empty() => None,
        InputContentPart::InputText { text } | InputContentPart::OutputText { text } => {
            Some(UnifiedPart::text(text.as_str()))
        }
        InputContentPart::Refusal { refusal } => Some(UnifiedPart::text(refusal.as_str())),
        InputContentPart::InputImage {
            image_url: Some(url), ..
        } => Some(UnifiedPart::Image {
            image: ImageData::from_url(url.as_str()),
        }),
        other => {
            log::debug!("Dropping unsupported input content part: {other:?}");
            None
        }
    }
}

fn content_text(content: &InputMessageContent) -> String {
    match content {
        InputMessageContent::Text(text) => text.clone(),
        InputMessageContent::Parts(parts) => join_text(parts.iter().filter_map(|part| match part {
            InputContentPart::InputText { text } | InputContentPart::OutputText { text } => Some(text.as_str()),
            _ => None,
        })),
    }
}

fn output_text(output: &FunctionCallOutput) -> String {
    match output {
        FunctionCallOutput::Text(text) => text.clone(),
        FunctionCallOutput::Parts(parts) => join_text(parts.iter().filter_map(|part| match part {
            InputContentPart::InputText { text } | InputContentPart::OutputText { text } => Some(text.as_str()),
            _ => None,
        })),
    }
}

impl MessageConverter for ResponsesConverter {
    type Request = ResponsesRequest;

    fn to_messages(&self, request: &ResponsesRequest) -> Vec<UnifiedMessage> {
        let mut builder = MessageBuilder::default();

        if let Some(instructions) = &request.instructions {
            builder.system(instructions.clone());
        }

        let items = match &request.input {
            ResponsesInput::Text(text) => {
                if !text.is_empty() {
                    builder.push(UnifiedRole::User, vec![UnifiedPart::text(text.as_str())]);
                }

                return builder.finish();
            }
            ResponsesInput::Items(items) => items,
        };

        let mut tool_names = ToolNameIndex::default();

        for item in items {
            if let InputItem::FunctionCall { call_id, name, .. } = item {
                tool_names.insert(call_id, name);
            }
        }

        let mut assistant = Vec::new();

        for item in items {
            match item {
                InputItem::Message(InputMessage { role, content, .. })
                | InputItem::EasyMessage(InputMessage { role, content, .. }) => match role {
                    InputRole::Assistant => assistant.extend(content_parts(content)),
                    InputRole::System | InputRole::Developer => {
                        builder.push(UnifiedRole::Assistant, std::mem::take(&mut assistant));
                        builder.system(content_text(content));
                    }
                    InputRole::User => {
                        builder.push(UnifiedRole::Assistant, std::mem::take(&mut assistant));
                        builder.push(UnifiedRole::User, content_parts(content));
                    }
                },
                InputItem::FunctionCall {
                    call_id,
                    name,
                    arguments,
                    ..
                } => assistant.push(UnifiedPart::ToolCall {
                    tool_call_id: call_id.clone(),
                    tool_name: name.clone(),
                    input: parse_arguments(arguments),
                    provider_options: self.options.cached_provider_options(call_id),
                }),
                InputItem::Reasoning {
                    id,
                    summary,
                    encrypted_content,
                } => assistant.extend(self.reasoning_part(id.as_deref(), summary, encrypted_content.as_deref())),
                InputItem::FunctionCallOutput { call_id, output } => {
                    builder.push(UnifiedRole::Assistant, std::mem::take(&mut assistant));

                    let result = UnifiedPart::ToolResult {
                        tool_call_id: call_id.clone(),
                        tool_name: tool_names.resolve(call_id, &self.options.unknown_tool_name),
                        output: ToolOutput::Text(output_text(output)),
                        is_error: false,
                    };

                    builder.push(UnifiedRole::Tool, vec![result]);
                }
                InputItem::Unknown(value) => log::debug!("Dropping unsupported input item: {value}"),
            }
        }

        builder.push(UnifiedRole::Assistant, assistant);
        builder.finish()
    }

    fn to_tools(&self, request: &ResponsesRequest) -> Option<Vec<UnifiedTool>> {
        let tools: Vec<UnifiedTool> = request
            .tools
            .as_ref()?
            .iter()
            .filter_map(|tool| match tool {
                ResponsesTool::Function {
                    name,
                    description,
                    parameters,
                    ..
                } => {
                    let parameters = parameters.clone().unwrap_or_else(empty_parameters);
                    Some(UnifiedTool::new(name.as_str(), description.clone(), &parameters))
                }
                ResponsesTool::Unknown(value) => {
                    log::debug!("Skipping built-in tool: {value}");
                    None
                }
            })
            .collect();

        (!tools.is_empty()).then_some(tools)
    }

    fn extract_generation_options(&self, request: &ResponsesRequest) -> GenerationOptions {
        GenerationOptions {
            max_output_tokens: request.max_output_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
            top_k: None,
            stop_sequences: None,
        }
    }

    fn extract_provider_options(&self, provider: &ProviderKind, request: &ResponsesRequest) -> Option<ProviderOptions> {
        let effort = request.reasoning.as_ref()?.effort.as_deref()?;

        map_thinking(provider, ThinkingControl::effort(effort)?, &self.options.reasoning_budgets)
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_json_snapshot;
    use serde_json::json;

    use super::*;
    use crate::unified::ConvertedRequest;

    fn convert(body: Value, provider: ProviderKind) -> ConvertedRequest {
        let request: ResponsesRequest = serde_json::from_value(body).unwrap();
        ResponsesConverter::new(ConverterOptions::default()).convert(&provider, &request)
    }

    #[test]
    fn empty_text_input_yields_no_message() {
        let converted = convert(json!({"model": "gpt-5", "input": ""}), ProviderKind::OpenAi);
        assert!(converted.messages.is_empty());

        let converted = convert(
            json!({"model": "gpt-5", "input": "", "instructions": "Be kind."}),
            ProviderKind::OpenAi,
        );

        assert_eq!(converted.messages.len(), 1);
        assert_eq!(converted.messages[0].role, UnifiedRole::System);
    }

    #[test]
    fn plain_text_input() {
        let converted = convert(
            json!({"model": "gpt-5", "input": "Hello", "instructions": "Be kind.", "max_output_tokens": 64}),
            ProviderKind::OpenAi,
        );

        assert_json_snapshot!(serde_json::to_value(&converted).unwrap(), @r#"
        {
          "generation": {
            "maxOutputTokens": 64
          },
          "messages": [
            {
              "content": [
                {
                  "text": "Be kind.",
                  "type": "text"
                }
              ],
              "role": "system"
            },
            {
              "content": [
                {
                  "text": "Hello",
                  "type": "text"
                }
              ],
              "role": "user"
            }
          ]
        }
        "#);
    }

    #[test]
    fn assistant_items_are_grouped() {
        let converted = convert(
            json!({
                "model": "gpt-5",
                "input": [
                    {"role": "user", "content": "Weather in SF?"},
                    {"type": "reasoning", "id": "rs_1", "summary": [{"type": "summary_text", "text": "Call the tool."}], "encrypted_content": "enc"},
                    {"type": "message", "role": "assistant", "content": [{"type": "output_text", "text": "Checking."}]},
                    {"type": "function_call", "call_id": "call_1", "name": "get_weather", "arguments": "{\"location\":\"SF\"}"},
                    {"type": "function_call_output", "call_id": "call_1", "output": "18C"},
                    {"type": "web_search_call", "id": "ws_1"},
                    {"type": "message", "role": "user", "content": [
                        {"type": "input_text", "text": "And this?"},
                        {"type": "input_image", "image_url": "https://example.com/a.png"}
                    ]}
                ]
            }),
            ProviderKind::OpenAi,
        );

        assert_json_snapshot!(serde_json::to_value(&converted.messages).unwrap(), @r#"
        [
          {
            "content": [
              {
                "text": "Weather in SF?",
                "type": "text"
              }
            ],
            "role": "user"
          },
          {
            "content": [
              {
                "providerOptions": {
                  "openai": {
                    "itemId": "rs_1",
                    "reasoningEncryptedContent": "enc"
                  }
                },
                "text": "Call the tool.",
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
              }
            ],
            "role": "tool"
          },
          {
            "content": [
              {
                "text": "And this?",
                "type": "text"
              },
              {
                "image": {
                  "kind": "url",
                  "url": "https://example.com/a.png"
                },
                "type": "image"
              }
            ],
            "role": "user"
          }
        ]
        "#);
    }

    #[test]
    fn empty_reasoning_items_are_dropped() {
        let converted = convert(
            json!({
                "model": "gpt-5",
                "input": [
                    {"type": "reasoning", "summary": []},
                    {"type": "function_call_output", "call_id": "call_404", "output": [{"type": "input_text", "text": "done"}]}
                ]
            }),
            ProviderKind::OpenAi,
        );

        assert_eq!(converted.messages.len(), 1);
        assert_json_snapshot!(serde_json::to_value(&converted.messages[0]).unwrap(), @r#"
        {
          "content": [
            {
              "isError": false,
              "output": {
                "type": "text",
                "value": "done"
              },
              "toolCallId": "call_404",
              "toolName": "unknown_tool",
              "type": "tool-result"
            }
          ],
          "role": "tool"
        }
        "#);
    }

    #[test]
    fn built_in_tools_are_skipped_and_effort_mapped() {
        let converted = convert(
            json!({
                "model": "gpt-5",
                "input": "hi",
                "reasoning": {"effort": "medium"},
                "tools": [
                    {"type": "web_search"},
                    {"type": "function", "name": "lookup", "parameters": {"type": "object", "properties": {"q": {"type": "string"}}}}
                ]
            }),
            ProviderKind::DeepSeek,
        );

        assert_json_snapshot!(json!({"tools": converted.tools, "providerOptions": converted.provider_options}), @r#"
        {
          "providerOptions": {
            "deepseek": {
              "thinking": true
            }
          },
          "tools": [
            {
              "name": "lookup",
              "parameters": {
                "properties": {
                  "q": {
                    "type": "string"
                  }
                },
                "type": "object"
              }
            }
          ]
        }
        "#);
    }
}
