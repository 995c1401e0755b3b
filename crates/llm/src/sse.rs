//! Server-Sent Events framing of vendor events.

use crate::{Result, adapter::VendorEvent};

/// End-of-stream marker shared by every output format.
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Serializes vendor events into SSE frames.
pub trait SseFormatter: Send + Sync {
    fn format_event(&self, event: &VendorEvent) -> Result<String>;

    fn format_done(&self) -> String {
        DONE_FRAME.to_string()
    }
}

/// `event: <type>` line followed by the data line.
#[derive(Debug, Default, Clone, Copy)]
pub struct MessagesFormatter;

impl SseFormatter for MessagesFormatter {
    fn format_event(&self, event: &VendorEvent) -> Result<String> {
        let data = sonic_rs::to_string(event)?;

        Ok(format!("event: {}\ndata: {data}\n\n", event.event_type()))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ChatCompletionsFormatter;

impl SseFormatter for ChatCompletionsFormatter {
    fn format_event(&self, event: &VendorEvent) -> Result<String> {
        data_frame(event)
    }
}

/// The event type is already part of the payload, so only data lines are sent.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResponsesFormatter;

impl SseFormatter for ResponsesFormatter {
    fn format_event(&self, event: &VendorEvent) -> Result<String> {
        data_frame(event)
    }
}

fn data_frame(event: &VendorEvent) -> Result<String> {
    let data = sonic_rs::to_string(event)?;

    Ok(format!("data: {data}\n\n"))
}
