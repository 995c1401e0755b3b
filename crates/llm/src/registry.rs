use std::sync::Arc;

use futures::Stream;
use indexmap::IndexMap;

use crate::{
    LlmError, Result,
    adapter::{
        AdapterOptions, ChatCompletionsProtocol, MessagesProtocol, ResponsesProtocol, StreamAdapter, WireProtocol,
    },
    sse::{ChatCompletionsFormatter, MessagesFormatter, ResponsesFormatter, SseFormatter},
    stream::AdaptedStream,
    unified::UnifiedStreamEvent,
};

type ProtocolConstructor = Arc<dyn Fn() -> Box<dyn WireProtocol> + Send + Sync>;
type FormatterConstructor = Arc<dyn Fn() -> Box<dyn SseFormatter> + Send + Sync>;

#[derive(Clone)]
struct Registration {
    protocol: ProtocolConstructor,
    formatter: FormatterConstructor,
}

/// Output formats by tag, each with the constructors of its wire protocol
/// and SSE formatter.
///
/// The three built-in formats are always present; more can be added with
/// [`AdapterRegistry::register`].
#[derive(Clone)]
pub struct AdapterRegistry {
    formats: IndexMap<String, Registration>,
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AdapterRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            formats: IndexMap::new(),
        };

        registry.register(
            "openai",
            || Box::new(ChatCompletionsProtocol::new()),
            || Box::new(ChatCompletionsFormatter),
        );

        registry.register(
            "anthropic",
            || Box::new(MessagesProtocol::new()),
            || Box::new(MessagesFormatter),
        );

        registry.register(
            "openai-responses",
            || Box::new(ResponsesProtocol::new()),
            || Box::new(ResponsesFormatter),
        );

        registry
    }

    /// Adds an output format, replacing any earlier registration of the same tag.
    pub fn register<P, F>(&mut self, format: impl Into<String>, protocol: P, formatter: F)
    where
        P: Fn() -> Box<dyn WireProtocol> + Send + Sync + 'static,
        F: Fn() -> Box<dyn SseFormatter> + Send + Sync + 'static,
    {
        let format = format.into();

        let registration = Registration {
            protocol: Arc::new(protocol),
            formatter: Arc::new(formatter),
        };

        if self.formats.insert(format.clone(), registration).is_some() {
            log::debug!("Replaced the registration of output format '{format}'");
        }
    }

    /// A fresh adapter for one response in the given format.
    pub fn create_adapter(&self, format: &str, options: AdapterOptions) -> Result<StreamAdapter> {
        let registration = self.lookup(format)?;

        Ok(StreamAdapter::new((registration.protocol)(), options))
    }

    pub fn formatter(&self, format: &str) -> Result<Box<dyn SseFormatter>> {
        let registration = self.lookup(format)?;

        Ok((registration.formatter)())
    }

    /// SSE frames of one response in the given format.
    pub fn sse_stream<S>(&self, format: &str, options: AdapterOptions, source: S) -> Result<AdaptedStream<S>>
    where
        S: Stream<Item = UnifiedStreamEvent>,
    {
        let registration = self.lookup(format)?;
        let adapter = StreamAdapter::new((registration.protocol)(), options);

        Ok(AdaptedStream::new(adapter, (registration.formatter)(), source))
    }

    pub fn supports_format(&self, format: &str) -> bool {
        self.formats.contains_key(format)
    }

    /// Registered tags in registration order.
    pub fn supported_formats(&self) -> Vec<String> {
        self.formats.keys().cloned().collect()
    }

    fn lookup(&self, format: &str) -> Result<&Registration> {
        self.formats.get(format).ok_or_else(|| LlmError::UnsupportedFormat {
            format: format.to_string(),
            supported: self.supported_formats(),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        adapter::{AdapterState, AggregateResponse, ContentBlockState, VendorEvent},
        unified::FinishReason,
    };

    /// Emits one JSON line per finished block.
    struct JsonLines;

    impl WireProtocol for JsonLines {
        fn id_prefix(&self) -> &str {
            "jl_"
        }

        fn opening(&mut self, _: &AdapterState, _: &mut Vec<VendorEvent>) {}

        fn block_opened(&mut self, _: &AdapterState, _: &ContentBlockState, _: &mut Vec<VendorEvent>) {}

        fn block_delta(&mut self, _: &AdapterState, _: &ContentBlockState, _: &str, _: &mut Vec<VendorEvent>) {}

        fn block_closed(&mut self, _: &AdapterState, block: &ContentBlockState, out: &mut Vec<VendorEvent>) {
            out.push(VendorEvent::Custom(json!({"type": "block", "content": block.content})));
        }

        fn closing(&mut self, _: &AdapterState, _: &mut Vec<VendorEvent>) {}

        fn aggregate(&self, state: &AdapterState) -> AggregateResponse {
            AggregateResponse::Custom(json!({"blocks": state.blocks.len()}))
        }
    }

    struct LineFormatter;

    impl SseFormatter for LineFormatter {
        fn format_event(&self, event: &VendorEvent) -> Result<String> {
            Ok(format!("{}\n", serde_json::to_string(event).unwrap_or_default()))
        }

        fn format_done(&self) -> String {
            String::new()
        }
    }

    #[test]
    fn builtin_formats() {
        let registry = AdapterRegistry::new();

        assert_eq!(registry.supported_formats(), ["openai", "anthropic", "openai-responses"]);
        assert!(registry.supports_format("anthropic"));
        assert!(!registry.supports_format("gemini"));

        let adapter = registry
            .create_adapter("openai-responses", AdapterOptions::new("gpt-5"))
            .unwrap();

        assert!(adapter.state().message_id.starts_with("resp_"));
    }

    #[test]
    fn unknown_format() {
        let registry = AdapterRegistry::new();

        let Err(error) = registry.formatter("gemini") else {
            unreachable!("gemini is not registered");
        };

        insta::assert_snapshot!(error, @"Unsupported format 'gemini', supported formats: openai, anthropic, openai-responses");

        assert!(matches!(
            registry.create_adapter("gemini", AdapterOptions::default()),
            Err(LlmError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn custom_format() {
        let mut registry = AdapterRegistry::new();
        registry.register("jsonl", || Box::new(JsonLines), || Box::new(LineFormatter));

        assert!(registry.supports_format("jsonl"));
        assert_eq!(registry.supported_formats().last().map(String::as_str), Some("jsonl"));

        let mut adapter = registry.create_adapter("jsonl", AdapterOptions::new("local")).unwrap();
        let formatter = registry.formatter("jsonl").unwrap();

        let mut events = adapter
            .consume(UnifiedStreamEvent::TextDelta {
                id: "t".to_string(),
                text: "hi".to_string(),
            })
            .unwrap();

        events.extend(
            adapter
                .consume(UnifiedStreamEvent::Finish {
                    finish_reason: FinishReason::Stop,
                    total_usage: None,
                })
                .unwrap(),
        );

        events.extend(adapter.finalize());

        let output: String = events
            .iter()
            .map(|event| formatter.format_event(event).unwrap())
            .collect();

        assert_eq!(output, "{\"content\":\"hi\",\"type\":\"block\"}\n");
        assert_eq!(adapter.build_aggregate_response(), AggregateResponse::Custom(json!({"blocks": 1})));
    }

    #[test]
    fn registering_again_replaces() {
        let mut registry = AdapterRegistry::new();
        registry.register("anthropic", || Box::new(JsonLines), || Box::new(LineFormatter));

        assert_eq!(registry.supported_formats().len(), 3);
        assert_eq!(registry.formatter("anthropic").unwrap().format_done(), "");
    }
}
