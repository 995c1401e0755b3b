use serde_json::json;

use crate::{
    convert::parse_arguments,
    protocol::anthropic::{self as wire, ContentDelta, Message, MessageDelta, ResponseContent, StreamEvent},
};

use super::{AdapterState, AggregateResponse, BlockKind, ContentBlockState, StopReason, VendorEvent, WireProtocol};

/// Messages streaming: `message_start`, indexed content block lifecycles, a
/// trailing `message_delta` and `message_stop`.
#[derive(Debug, Default)]
pub struct MessagesProtocol;

impl MessagesProtocol {
    pub fn new() -> Self {
        Self
    }
}

fn stop_reason(reason: StopReason) -> wire::StopReason {
    match reason {
        StopReason::EndTurn => wire::StopReason::EndTurn,
        StopReason::MaxTokens => wire::StopReason::MaxTokens,
        StopReason::ToolUse => wire::StopReason::ToolUse,
        StopReason::Refusal => wire::StopReason::Refusal,
    }
}

fn usage(state: &AdapterState) -> wire::Usage {
    wire::Usage {
        input_tokens: state.usage.input,
        output_tokens: state.usage.output,
        cache_read_input_tokens: (state.usage.cached_input > 0).then_some(state.usage.cached_input),
        unknown_fields: Default::default(),
    }
}

impl WireProtocol for MessagesProtocol {
    fn id_prefix(&self) -> &str {
        "msg_"
    }

    fn opening(&mut self, state: &AdapterState, out: &mut Vec<VendorEvent>) {
        let mut message = Message::new(state.message_id.as_str(), state.model.as_str());
        message.usage = usage(state);

        out.push(
            StreamEvent::MessageStart {
                message: Box::new(message),
            }
            .into(),
        );
    }

    fn block_opened(&mut self, _: &AdapterState, block: &ContentBlockState, out: &mut Vec<VendorEvent>) {
        let content_block = match block.kind {
            BlockKind::Text => ResponseContent::Text { text: String::new() },
            BlockKind::Thinking => ResponseContent::Thinking {
                thinking: String::new(),
                signature: String::new(),
            },
            BlockKind::ToolUse => ResponseContent::ToolUse {
                id: block.tool_call_id().to_string(),
                name: block.tool_name().to_string(),
                input: json!({}),
            },
        };

        out.push(
            StreamEvent::ContentBlockStart {
                index: block.index,
                content_block,
            }
            .into(),
        );
    }

    fn block_delta(&mut self, _: &AdapterState, block: &ContentBlockState, delta: &str, out: &mut Vec<VendorEvent>) {
        let delta = match block.kind {
            BlockKind::Text => ContentDelta::TextDelta { text: delta.to_string() },
            BlockKind::Thinking => ContentDelta::ThinkingDelta {
                thinking: delta.to_string(),
            },
            BlockKind::ToolUse => ContentDelta::InputJsonDelta {
                partial_json: delta.to_string(),
            },
        };

        out.push(
            StreamEvent::ContentBlockDelta {
                index: block.index,
                delta,
            }
            .into(),
        );
    }

    fn block_closed(&mut self, _: &AdapterState, block: &ContentBlockState, out: &mut Vec<VendorEvent>) {
        if let Some(signature) = block.metadata_str("anthropic", "signature") {
            out.push(
                StreamEvent::ContentBlockDelta {
                    index: block.index,
                    delta: ContentDelta::SignatureDelta {
                        signature: signature.to_string(),
                    },
                }
                .into(),
            );
        }

        out.push(StreamEvent::ContentBlockStop { index: block.index }.into());
    }

    fn closing(&mut self, state: &AdapterState, out: &mut Vec<VendorEvent>) {
        out.push(
            StreamEvent::MessageDelta {
                delta: MessageDelta {
                    stop_reason: Some(stop_reason(state.final_stop_reason())),
                    stop_sequence: None,
                },
                usage: usage(state),
            }
            .into(),
        );

        out.push(StreamEvent::MessageStop.into());
    }

    fn aggregate(&self, state: &AdapterState) -> AggregateResponse {
        let mut message = Message::new(state.message_id.as_str(), state.model.as_str());

        message.content = state
            .blocks
            .values()
            .map(|block| match block.kind {
                BlockKind::Text => ResponseContent::Text {
                    text: block.content.clone(),
                },
                BlockKind::Thinking => match block.metadata_str("anthropic", "redactedData") {
                    Some(data) if block.content.is_empty() => ResponseContent::RedactedThinking {
                        data: data.to_string(),
                    },
                    _ => ResponseContent::Thinking {
                        thinking: block.content.clone(),
                        signature: block.metadata_str("anthropic", "signature").unwrap_or_default().to_string(),
                    },
                },
                BlockKind::ToolUse => ResponseContent::ToolUse {
                    id: block.tool_call_id().to_string(),
                    name: block.tool_name().to_string(),
                    input: parse_arguments(&block.content),
                },
            })
            .collect();

        message.stop_reason = Some(stop_reason(state.final_stop_reason()));
        message.usage = usage(state);

        AggregateResponse::Messages(Box::new(message))
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_json_snapshot;
    use serde_json::json;

    use crate::{
        adapter::{AdapterOptions, StreamAdapter, VendorEvent},
        unified::{FinishReason, ProviderOptions, UnifiedStreamEvent, UnifiedUsage},
    };

    use super::MessagesProtocol;

    fn adapter() -> StreamAdapter {
        let options = AdapterOptions {
            message_id: Some("msg_test".to_string()),
            created: Some(1_700_000_000),
            ..AdapterOptions::new("claude-sonnet-4")
        };

        StreamAdapter::new(Box::new(MessagesProtocol::new()), options)
    }

    fn run(adapter: &mut StreamAdapter, events: Vec<UnifiedStreamEvent>) -> Vec<VendorEvent> {
        let mut out = Vec::new();

        for event in events {
            out.extend(adapter.consume(event).unwrap());
        }

        out.extend(adapter.finalize());
        out
    }

    #[test]
    fn thinking_then_text() {
        let mut adapter = adapter();

        let events = run(
            &mut adapter,
            vec![
                UnifiedStreamEvent::ReasoningDelta {
                    id: "r1".to_string(),
                    text: "Let me think.".to_string(),
                    provider_metadata: None,
                },
                UnifiedStreamEvent::ReasoningEnd {
                    id: "r1".to_string(),
                    provider_metadata: Some(ProviderOptions::for_provider(
                        "anthropic",
                        json!({"signature": "sig-1"}),
                    )),
                },
                UnifiedStreamEvent::TextDelta {
                    id: "t1".to_string(),
                    text: "Hi".to_string(),
                },
                UnifiedStreamEvent::Finish {
                    finish_reason: FinishReason::Length,
                    total_usage: Some(UnifiedUsage {
                        input_tokens: Some(12),
                        output_tokens: Some(7),
                        cached_input_tokens: Some(4),
                        reasoning_tokens: None,
                    }),
                },
            ],
        );

        assert_json_snapshot!(serde_json::to_value(&events).unwrap(), @r#"
        [
          {
            "message": {
              "content": [],
              "id": "msg_test",
              "model": "claude-sonnet-4",
              "role": "assistant",
              "stop_reason": null,
              "stop_sequence": null,
              "type": "message",
              "usage": {
                "input_tokens": 0,
                "output_tokens": 0
              }
            },
            "type": "message_start"
          },
          {
            "content_block": {
              "signature": "",
              "thinking": "",
              "type": "thinking"
            },
            "index": 0,
            "type": "content_block_start"
          },
          {
            "delta": {
              "thinking": "Let me think.",
              "type": "thinking_delta"
            },
            "index": 0,
            "type": "content_block_delta"
          },
          {
            "delta": {
              "signature": "sig-1",
              "type": "signature_delta"
            },
            "index": 0,
            "type": "content_block_delta"
          },
          {
            "index": 0,
            "type": "content_block_stop"
          },
          {
            "content_block": {
              "text": "",
              "type": "text"
            },
            "index": 1,
            "type": "content_block_start"
          },
          {
            "delta": {
              "text": "Hi",
              "type": "text_delta"
            },
            "index": 1,
            "type": "content_block_delta"
          },
          {
            "index": 1,
            "type": "content_block_stop"
          },
          {
            "delta": {
              "stop_reason": "max_tokens",
              "stop_sequence": null
            },
            "type": "message_delta",
            "usage": {
              "cache_read_input_tokens": 4,
              "input_tokens": 12,
              "output_tokens": 7
            }
          },
          {
            "type": "message_stop"
          }
        ]
        "#);

        assert_json_snapshot!(serde_json::to_value(&adapter.build_aggregate_response()).unwrap(), @r#"
        {
          "content": [
            {
              "signature": "sig-1",
              "thinking": "Let me think.",
              "type": "thinking"
            },
            {
              "text": "Hi",
              "type": "text"
            }
          ],
          "id": "msg_test",
          "model": "claude-sonnet-4",
          "role": "assistant",
          "stop_reason": "max_tokens",
          "stop_sequence": null,
          "type": "message",
          "usage": {
            "cache_read_input_tokens": 4,
            "input_tokens": 12,
            "output_tokens": 7
          }
        }
        "#);
    }

    #[test]
    fn tool_call_block() {
        let mut adapter = adapter();

        let events = run(
            &mut adapter,
            vec![
                UnifiedStreamEvent::ToolCall {
                    tool_call_id: "toolu_1".to_string(),
                    tool_name: "get_weather".to_string(),
                    input: json!({"location": "SF"}),
                    provider_metadata: None,
                },
                UnifiedStreamEvent::Finish {
                    finish_reason: FinishReason::Stop,
                    total_usage: None,
                },
            ],
        );

        let types: Vec<&str> = events.iter().map(VendorEvent::event_type).collect();

        assert_eq!(
            types,
            [
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop"
            ]
        );

        assert_json_snapshot!(serde_json::to_value(&events[1..4]).unwrap(), @r#"
        [
          {
            "content_block": {
              "id": "toolu_1",
              "input": {},
              "name": "get_weather",
              "type": "tool_use"
            },
            "index": 0,
            "type": "content_block_start"
          },
          {
            "delta": {
              "partial_json": "{\"location\":\"SF\"}",
              "type": "input_json_delta"
            },
            "index": 0,
            "type": "content_block_delta"
          },
          {
            "index": 0,
            "type": "content_block_stop"
          }
        ]
        "#);

        assert_json_snapshot!(serde_json::to_value(&events[4]).unwrap(), @r#"
        {
          "delta": {
            "stop_reason": "tool_use",
            "stop_sequence": null
          },
          "type": "message_delta",
          "usage": {
            "input_tokens": 0,
            "output_tokens": 0
          }
        }
        "#);
    }
}
