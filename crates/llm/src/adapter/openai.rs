use crate::protocol::openai::{
    AssistantMessage, ChatChoice, ChatCompletionChunk, ChatCompletionResponse, ChunkChoice, ChunkDelta,
    CompletionTokensDetails, FinishReason, FunctionCallDelta, PromptTokensDetails, ToolCall, ToolCallDelta, Usage,
};

use super::{AdapterState, AggregateResponse, BlockKind, ContentBlockState, StopReason, VendorEvent, WireProtocol};

/// Chat Completions streaming: one `chat.completion.chunk` per delta, a
/// finish chunk and a trailing usage chunk with no choices.
#[derive(Debug, Default)]
pub struct ChatCompletionsProtocol;

impl ChatCompletionsProtocol {
    pub fn new() -> Self {
        Self
    }
}

fn finish_reason(reason: StopReason) -> FinishReason {
    match reason {
        StopReason::EndTurn => FinishReason::Stop,
        StopReason::MaxTokens => FinishReason::Length,
        StopReason::ToolUse => FinishReason::ToolCalls,
        StopReason::Refusal => FinishReason::ContentFilter,
    }
}

fn usage(state: &AdapterState) -> Usage {
    let usage = state.usage;

    Usage {
        prompt_tokens: usage.input,
        completion_tokens: usage.output,
        total_tokens: usage.total(),
        prompt_tokens_details: (usage.cached_input > 0).then_some(PromptTokensDetails {
            cached_tokens: usage.cached_input,
        }),
        completion_tokens_details: (usage.reasoning > 0).then_some(CompletionTokensDetails {
            reasoning_tokens: usage.reasoning,
        }),
    }
}

/// Position of a tool block among the tool calls of the response.
fn tool_ordinal(state: &AdapterState, block: &ContentBlockState) -> u32 {
    let earlier = state
        .blocks_of(BlockKind::ToolUse)
        .take_while(|tool| tool.index < block.index)
        .count();

    u32::try_from(earlier).unwrap_or(u32::MAX)
}

fn base_chunk(state: &AdapterState, choices: Vec<ChunkChoice>) -> ChatCompletionChunk {
    ChatCompletionChunk {
        id: state.message_id.clone(),
        object: "chat.completion.chunk".to_string(),
        created: state.created,
        model: state.model.clone(),
        choices,
        usage: None,
    }
}

fn chunk(state: &AdapterState, choices: Vec<ChunkChoice>) -> VendorEvent {
    base_chunk(state, choices).into()
}

fn delta_chunk(state: &AdapterState, delta: ChunkDelta) -> VendorEvent {
    chunk(
        state,
        vec![ChunkChoice {
            index: 0,
            delta,
            logprobs: None,
            finish_reason: None,
        }],
    )
}

impl WireProtocol for ChatCompletionsProtocol {
    fn id_prefix(&self) -> &str {
        "chatcmpl-"
    }

    fn opening(&mut self, state: &AdapterState, out: &mut Vec<VendorEvent>) {
        let delta = ChunkDelta {
            role: Some("assistant".to_string()),
            content: Some(String::new()),
            ..Default::default()
        };

        out.push(delta_chunk(state, delta));
    }

    fn block_opened(&mut self, state: &AdapterState, block: &ContentBlockState, out: &mut Vec<VendorEvent>) {
        if block.kind != BlockKind::ToolUse {
            return;
        }

        let call = ToolCallDelta {
            index: tool_ordinal(state, block),
            id: Some(block.tool_call_id().to_string()),
            kind: Some("function".to_string()),
            function: FunctionCallDelta {
                name: Some(block.tool_name().to_string()),
                arguments: Some(String::new()),
            },
        };

        let delta = ChunkDelta {
            tool_calls: Some(vec![call]),
            ..Default::default()
        };

        out.push(delta_chunk(state, delta));
    }

    fn block_delta(
        &mut self,
        state: &AdapterState,
        block: &ContentBlockState,
        delta: &str,
        out: &mut Vec<VendorEvent>,
    ) {
        let delta = match block.kind {
            BlockKind::Text => ChunkDelta {
                content: Some(delta.to_string()),
                ..Default::default()
            },
            BlockKind::Thinking => ChunkDelta {
                reasoning_content: Some(delta.to_string()),
                ..Default::default()
            },
            BlockKind::ToolUse => ChunkDelta {
                tool_calls: Some(vec![ToolCallDelta {
                    index: tool_ordinal(state, block),
                    id: None,
                    kind: None,
                    function: FunctionCallDelta {
                        name: None,
                        arguments: Some(delta.to_string()),
                    },
                }]),
                ..Default::default()
            },
        };

        out.push(delta_chunk(state, delta));
    }

    fn block_closed(&mut self, _: &AdapterState, _: &ContentBlockState, _: &mut Vec<VendorEvent>) {}

    fn closing(&mut self, state: &AdapterState, out: &mut Vec<VendorEvent>) {
        let finish = ChunkChoice {
            index: 0,
            delta: ChunkDelta::default(),
            logprobs: None,
            finish_reason: Some(finish_reason(state.final_stop_reason())),
        };

        out.push(chunk(state, vec![finish]));

        let usage_chunk = ChatCompletionChunk {
            usage: Some(usage(state)),
            ..base_chunk(state, Vec::new())
        };

        out.push(usage_chunk.into());
    }

    fn aggregate(&self, state: &AdapterState) -> AggregateResponse {
        let text: String = state.blocks_of(BlockKind::Text).map(|block| block.content.as_str()).collect();

        let reasoning: String = state
            .blocks_of(BlockKind::Thinking)
            .map(|block| block.content.as_str())
            .collect();

        let tool_calls: Vec<ToolCall> = state
            .blocks_of(BlockKind::ToolUse)
            .map(|block| ToolCall::function(block.tool_call_id(), block.tool_name(), block.content.as_str()))
            .collect();

        let message = AssistantMessage {
            role: "assistant".to_string(),
            content: (!text.is_empty()).then_some(text),
            reasoning_content: (!reasoning.is_empty()).then_some(reasoning),
            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        };

        let response = ChatCompletionResponse {
            id: state.message_id.clone(),
            object: "chat.completion".to_string(),
            created: state.created,
            model: state.model.clone(),
            choices: vec![ChatChoice {
                index: 0,
                message,
                logprobs: None,
                finish_reason: finish_reason(state.final_stop_reason()),
            }],
            usage: usage(state),
        };

        AggregateResponse::ChatCompletion(Box::new(response))
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_json_snapshot;
    use serde_json::json;

    use crate::{
        adapter::{AdapterOptions, StreamAdapter, VendorEvent},
        unified::{FinishReason, UnifiedStreamEvent, UnifiedUsage},
    };

    use super::ChatCompletionsProtocol;

    fn adapter() -> StreamAdapter {
        let options = AdapterOptions {
            message_id: Some("chatcmpl-test".to_string()),
            created: Some(1_700_000_000),
            ..AdapterOptions::new("gpt-4o")
        };

        StreamAdapter::new(Box::new(ChatCompletionsProtocol::new()), options)
    }

    fn run(adapter: &mut StreamAdapter, events: Vec<UnifiedStreamEvent>) -> Vec<VendorEvent> {
        let mut out = Vec::new();

        for event in events {
            out.extend(adapter.consume(event).unwrap());
        }

        out.extend(adapter.finalize());
        out
    }

    fn tool_call(id: &str, name: &str) -> UnifiedStreamEvent {
        UnifiedStreamEvent::ToolCall {
            tool_call_id: id.to_string(),
            tool_name: name.to_string(),
            input: json!({"q": id}),
            provider_metadata: None,
        }
    }

    #[test]
    fn reasoning_text_and_usage() {
        let mut adapter = adapter();

        let events = run(
            &mut adapter,
            vec![
                UnifiedStreamEvent::ReasoningDelta {
                    id: "r1".to_string(),
                    text: "Hmm.".to_string(),
                    provider_metadata: None,
                },
                UnifiedStreamEvent::TextDelta {
                    id: "t1".to_string(),
                    text: "Hello".to_string(),
                },
                UnifiedStreamEvent::Finish {
                    finish_reason: FinishReason::Stop,
                    total_usage: Some(UnifiedUsage {
                        input_tokens: Some(10),
                        output_tokens: Some(5),
                        cached_input_tokens: None,
                        reasoning_tokens: Some(2),
                    }),
                },
            ],
        );

        assert_json_snapshot!(serde_json::to_value(&events).unwrap(), @r#"
        [
          {
            "choices": [
              {
                "delta": {
                  "content": "",
                  "role": "assistant"
                },
                "finish_reason": null,
                "index": 0,
                "logprobs": null
              }
            ],
            "created": 1700000000,
            "id": "chatcmpl-test",
            "model": "gpt-4o",
            "object": "chat.completion.chunk"
          },
          {
            "choices": [
              {
                "delta": {
                  "reasoning_content": "Hmm."
                },
                "finish_reason": null,
                "index": 0,
                "logprobs": null
              }
            ],
            "created": 1700000000,
            "id": "chatcmpl-test",
            "model": "gpt-4o",
            "object": "chat.completion.chunk"
          },
          {
            "choices": [
              {
                "delta": {
                  "content": "Hello"
                },
                "finish_reason": null,
                "index": 0,
                "logprobs": null
              }
            ],
            "created": 1700000000,
            "id": "chatcmpl-test",
            "model": "gpt-4o",
            "object": "chat.completion.chunk"
          },
          {
            "choices": [
              {
                "delta": {},
                "finish_reason": "stop",
                "index": 0,
                "logprobs": null
              }
            ],
            "created": 1700000000,
            "id": "chatcmpl-test",
            "model": "gpt-4o",
            "object": "chat.completion.chunk"
          },
          {
            "choices": [],
            "created": 1700000000,
            "id": "chatcmpl-test",
            "model": "gpt-4o",
            "object": "chat.completion.chunk",
            "usage": {
              "completion_tokens": 5,
              "completion_tokens_details": {
                "reasoning_tokens": 2
              },
              "prompt_tokens": 10,
              "total_tokens": 15
            }
          }
        ]
        "#);
    }

    #[test]
    fn tool_calls_are_indexed_by_ordinal() {
        let mut adapter = adapter();

        let events = run(
            &mut adapter,
            vec![
                UnifiedStreamEvent::TextDelta {
                    id: "t1".to_string(),
                    text: "Looking up.".to_string(),
                },
                tool_call("call_a", "search"),
                tool_call("call_b", "fetch"),
                UnifiedStreamEvent::Finish {
                    finish_reason: FinishReason::Stop,
                    total_usage: None,
                },
            ],
        );

        let tool_deltas: Vec<_> = events
            .iter()
            .filter_map(|event| match event {
                VendorEvent::ChatCompletion(chunk) => chunk.choices.first()?.delta.tool_calls.clone(),
                _ => None,
            })
            .flatten()
            .collect();

        assert_json_snapshot!(serde_json::to_value(&tool_deltas).unwrap(), @r#"
        [
          {
            "function": {
              "arguments": "",
              "name": "search"
            },
            "id": "call_a",
            "index": 0,
            "type": "function"
          },
          {
            "function": {
              "arguments": "{\"q\":\"call_a\"}"
            },
            "index": 0
          },
          {
            "function": {
              "arguments": "",
              "name": "fetch"
            },
            "id": "call_b",
            "index": 1,
            "type": "function"
          },
          {
            "function": {
              "arguments": "{\"q\":\"call_b\"}"
            },
            "index": 1
          }
        ]
        "#);

        assert_json_snapshot!(serde_json::to_value(&adapter.build_aggregate_response()).unwrap(), @r#"
        {
          "choices": [
            {
              "finish_reason": "tool_calls",
              "index": 0,
              "logprobs": null,
              "message": {
                "content": "Looking up.",
                "role": "assistant",
                "tool_calls": [
                  {
                    "function": {
                      "arguments": "{\"q\":\"call_a\"}",
                      "name": "search"
                    },
                    "id": "call_a",
                    "type": "function"
                  },
                  {
                    "function": {
                      "arguments": "{\"q\":\"call_b\"}",
                      "name": "fetch"
                    },
                    "id": "call_b",
                    "type": "function"
                  }
                ]
              }
            }
          ],
          "created": 1700000000,
          "id": "chatcmpl-test",
          "model": "gpt-4o",
          "object": "chat.completion",
          "usage": {
            "completion_tokens": 0,
            "prompt_tokens": 0,
            "total_tokens": 0
          }
        }
        "#);
    }
}
