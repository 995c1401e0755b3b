use crate::protocol::responses::{
    IncompleteDetails, InputTokensDetails, OutputContent, OutputItem, OutputTokensDetails, ResponseObject,
    ResponseStatus, ResponseStreamEvent, ResponseUsage, SummaryPart,
};

use super::{AdapterState, AggregateResponse, BlockKind, ContentBlockState, StopReason, VendorEvent, WireProtocol};

/// Responses streaming.
///
/// The response object is re-sent on `response.created`,
/// `response.in_progress` and the terminal event. Every block is one output
/// item whose `output_index` is the block index, and every event carries a
/// `sequence_number` counted over the whole stream.
#[derive(Debug, Default)]
pub struct ResponsesProtocol {
    sequence: u64,
}

impl ResponsesProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_sequence(&mut self) -> u64 {
        let sequence = self.sequence;
        self.sequence += 1;
        sequence
    }
}

fn item_id(state: &AdapterState, block: &ContentBlockState) -> String {
    let prefix = match block.kind {
        BlockKind::Text => "msg",
        BlockKind::Thinking => "rs",
        BlockKind::ToolUse => "fc",
    };

    let base = state.message_id.strip_prefix("resp_").unwrap_or(&state.message_id);

    format!("{prefix}_{base}_{}", block.index)
}

/// The output item of a block, as announced or as completed.
fn output_item(state: &AdapterState, block: &ContentBlockState) -> OutputItem {
    let id = item_id(state, block);

    let status = if block.closed {
        ResponseStatus::Completed
    } else {
        ResponseStatus::InProgress
    };

    match block.kind {
        BlockKind::Text => OutputItem::Message {
            id,
            status,
            role: "assistant".to_string(),
            content: if block.closed {
                vec![OutputContent::text(block.content.as_str())]
            } else {
                Vec::new()
            },
        },
        BlockKind::Thinking => OutputItem::Reasoning {
            id,
            status: Some(status),
            summary: if block.closed && !block.content.is_empty() {
                vec![SummaryPart::SummaryText {
                    text: block.content.clone(),
                }]
            } else {
                Vec::new()
            },
            encrypted_content: block
                .metadata_str("openai", "reasoningEncryptedContent")
                .map(str::to_string),
        },
        BlockKind::ToolUse => OutputItem::FunctionCall {
            id,
            call_id: block.tool_call_id().to_string(),
            name: block.tool_name().to_string(),
            arguments: if block.closed {
                block.content.clone()
            } else {
                String::new()
            },
            status,
        },
    }
}

fn usage(state: &AdapterState) -> ResponseUsage {
    let usage = state.usage;

    ResponseUsage {
        input_tokens: usage.input,
        input_tokens_details: InputTokensDetails {
            cached_tokens: usage.cached_input,
        },
        output_tokens: usage.output,
        output_tokens_details: OutputTokensDetails {
            reasoning_tokens: usage.reasoning,
        },
        total_tokens: usage.total(),
    }
}

fn response(state: &AdapterState, status: ResponseStatus) -> ResponseObject {
    let done = status != ResponseStatus::InProgress;

    let incomplete_details = match (status, state.final_stop_reason()) {
        (ResponseStatus::Incomplete, StopReason::MaxTokens) => Some("max_output_tokens"),
        (ResponseStatus::Incomplete, _) => Some("content_filter"),
        _ => None,
    };

    ResponseObject {
        id: state.message_id.clone(),
        object: "response".to_string(),
        created_at: state.created,
        status,
        error: None,
        incomplete_details: incomplete_details.map(|reason| IncompleteDetails {
            reason: reason.to_string(),
        }),
        model: state.model.clone(),
        output: if done {
            state.blocks.values().map(|block| output_item(state, block)).collect()
        } else {
            Vec::new()
        },
        usage: done.then(|| usage(state)),
    }
}

fn final_status(state: &AdapterState) -> ResponseStatus {
    match state.final_stop_reason() {
        StopReason::MaxTokens | StopReason::Refusal => ResponseStatus::Incomplete,
        StopReason::EndTurn | StopReason::ToolUse => ResponseStatus::Completed,
    }
}

impl WireProtocol for ResponsesProtocol {
    fn id_prefix(&self) -> &str {
        "resp_"
    }

    fn opening(&mut self, state: &AdapterState, out: &mut Vec<VendorEvent>) {
        out.push(
            ResponseStreamEvent::Created {
                sequence_number: self.next_sequence(),
                response: Box::new(response(state, ResponseStatus::InProgress)),
            }
            .into(),
        );

        out.push(
            ResponseStreamEvent::InProgress {
                sequence_number: self.next_sequence(),
                response: Box::new(response(state, ResponseStatus::InProgress)),
            }
            .into(),
        );
    }

    fn block_opened(&mut self, state: &AdapterState, block: &ContentBlockState, out: &mut Vec<VendorEvent>) {
        out.push(
            ResponseStreamEvent::OutputItemAdded {
                sequence_number: self.next_sequence(),
                output_index: block.index,
                item: output_item(state, block),
            }
            .into(),
        );

        let part = match block.kind {
            BlockKind::Text => ResponseStreamEvent::ContentPartAdded {
                sequence_number: self.next_sequence(),
                item_id: item_id(state, block),
                output_index: block.index,
                content_index: 0,
                part: OutputContent::text(""),
            },
            BlockKind::Thinking => ResponseStreamEvent::ReasoningSummaryPartAdded {
                sequence_number: self.next_sequence(),
                item_id: item_id(state, block),
                output_index: block.index,
                summary_index: 0,
                part: SummaryPart::SummaryText { text: String::new() },
            },
            BlockKind::ToolUse => return,
        };

        out.push(part.into());
    }

    fn block_delta(
        &mut self,
        state: &AdapterState,
        block: &ContentBlockState,
        delta: &str,
        out: &mut Vec<VendorEvent>,
    ) {
        let sequence_number = self.next_sequence();
        let item_id = item_id(state, block);
        let delta = delta.to_string();

        let event = match block.kind {
            BlockKind::Text => ResponseStreamEvent::OutputTextDelta {
                sequence_number,
                item_id,
                output_index: block.index,
                content_index: 0,
                delta,
                logprobs: Vec::new(),
            },
            BlockKind::Thinking => ResponseStreamEvent::ReasoningSummaryTextDelta {
                sequence_number,
                item_id,
                output_index: block.index,
                summary_index: 0,
                delta,
            },
            BlockKind::ToolUse => ResponseStreamEvent::FunctionCallArgumentsDelta {
                sequence_number,
                item_id,
                output_index: block.index,
                delta,
            },
        };

        out.push(event.into());
    }

    fn block_closed(&mut self, state: &AdapterState, block: &ContentBlockState, out: &mut Vec<VendorEvent>) {
        let item_id = item_id(state, block);

        match block.kind {
            BlockKind::Text => {
                out.push(
                    ResponseStreamEvent::OutputTextDone {
                        sequence_number: self.next_sequence(),
                        item_id: item_id.clone(),
                        output_index: block.index,
                        content_index: 0,
                        text: block.content.clone(),
                        logprobs: Vec::new(),
                    }
                    .into(),
                );

                out.push(
                    ResponseStreamEvent::ContentPartDone {
                        sequence_number: self.next_sequence(),
                        item_id,
                        output_index: block.index,
                        content_index: 0,
                        part: OutputContent::text(block.content.as_str()),
                    }
                    .into(),
                );
            }
            BlockKind::Thinking => {
                out.push(
                    ResponseStreamEvent::ReasoningSummaryTextDone {
                        sequence_number: self.next_sequence(),
                        item_id: item_id.clone(),
                        output_index: block.index,
                        summary_index: 0,
                        text: block.content.clone(),
                    }
                    .into(),
                );

                out.push(
                    ResponseStreamEvent::ReasoningSummaryPartDone {
                        sequence_number: self.next_sequence(),
                        item_id,
                        output_index: block.index,
                        summary_index: 0,
                        part: SummaryPart::SummaryText {
                            text: block.content.clone(),
                        },
                    }
                    .into(),
                );
            }
            BlockKind::ToolUse => {
                out.push(
                    ResponseStreamEvent::FunctionCallArgumentsDone {
                        sequence_number: self.next_sequence(),
                        item_id,
                        output_index: block.index,
                        arguments: block.content.clone(),
                    }
                    .into(),
                );
            }
        }

        out.push(
            ResponseStreamEvent::OutputItemDone {
                sequence_number: self.next_sequence(),
                output_index: block.index,
                item: output_item(state, block),
            }
            .into(),
        );
    }

    fn closing(&mut self, state: &AdapterState, out: &mut Vec<VendorEvent>) {
        let status = final_status(state);
        let sequence_number = self.next_sequence();
        let response = Box::new(response(state, status));

        let event = match status {
            ResponseStatus::Incomplete => ResponseStreamEvent::Incomplete {
                sequence_number,
                response,
            },
            _ => ResponseStreamEvent::Completed {
                sequence_number,
                response,
            },
        };

        out.push(event.into());
    }

    fn aggregate(&self, state: &AdapterState) -> AggregateResponse {
        AggregateResponse::Responses(Box::new(response(state, final_status(state))))
    }
}
