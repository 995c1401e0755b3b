//! Protocol adapters between three LLM API formats (Chat Completions,
//! Messages and Responses) and one neutral representation.
//!
//! Inbound, [`ConverterFactory`] turns a request body of any supported format
//! into neutral messages, tools and options. Outbound, a [`StreamAdapter`]
//! created through the [`AdapterRegistry`] turns the neutral event stream of a
//! model backend into the events of the requested format, and an
//! [`SseFormatter`] frames them for the wire.

mod adapter;
mod cache;
mod convert;
mod error;
pub mod protocol;
mod registry;
pub mod schema;
mod sse;
mod stream;
pub mod unified;

pub use adapter::{
    AdapterOptions, AdapterState, AggregateResponse, BlockKind, ChatCompletionsProtocol, ContentBlockState,
    MessagesProtocol, ResponsesProtocol, StopReason, StreamAdapter, TokenCounts, VendorEvent, WireProtocol,
};
pub use cache::{MokaReasoningCache, ReasoningCache};
pub use convert::{
    AnyConverter, ChatCompletionsConverter, ConverterFactory, ConverterOptions, InputFormat, MessageConverter,
    MessagesConverter, ReasoningEffort, ResponsesConverter, ThinkingControl, map_thinking,
};
pub use error::{LlmError, Result};
pub use registry::AdapterRegistry;
pub use sse::{ChatCompletionsFormatter, DONE_FRAME, MessagesFormatter, ResponsesFormatter, SseFormatter};
pub use stream::{AdaptedStream, aggregate};
