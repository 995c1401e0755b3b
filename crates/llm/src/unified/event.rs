use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ProviderOptions;

/// One event of the neutral generation stream produced by the model backend.
///
/// The backend pushes these one at a time into a [`StreamAdapter`](crate::StreamAdapter),
/// which turns them into vendor-native SSE events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum UnifiedStreamEvent {
    TextStart {
        id: String,
    },
    TextDelta {
        id: String,
        #[serde(alias = "delta")]
        text: String,
    },
    TextEnd {
        id: String,
    },
    ReasoningStart {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider_metadata: Option<ProviderOptions>,
    },
    ReasoningDelta {
        id: String,
        #[serde(alias = "delta")]
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider_metadata: Option<ProviderOptions>,
    },
    /// Closing a reasoning stream may deliver its signature in the metadata.
    ReasoningEnd {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider_metadata: Option<ProviderOptions>,
    },
    /// A complete tool call. Arguments are never streamed incrementally.
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        input: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider_metadata: Option<ProviderOptions>,
    },
    /// Tool execution results are not re-streamed to the caller.
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        #[serde(default)]
        output: Value,
    },
    FinishStep {
        finish_reason: FinishReason,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<UnifiedUsage>,
    },
    Finish {
        finish_reason: FinishReason,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total_usage: Option<UnifiedUsage>,
    },
    /// Fatal. The output stream is aborted with this error.
    Error {
        error: UpstreamError,
    },
    /// Lifecycle markers the adapters have no use for (`start`, `start-step`, ...).
    #[serde(other)]
    Unknown,
}

/// Why the backend stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Error,
    Other,
    #[serde(other)]
    Unknown,
}

/// Token accounting reported by the backend. Every counter is optional; an
/// absent counter leaves the adapter's running value untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedUsage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_input_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_tokens: Option<u32>,
}

/// Error value carried by the neutral `error` event.
///
/// It is handed back to the caller unchanged when the adapter aborts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(from = "UpstreamErrorRepr")]
#[error("{message}")]
pub struct UpstreamError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl UpstreamError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: None,
            data: None,
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }
}

/// Backends report errors as a bare string, an object, or any other JSON value.
#[derive(Deserialize)]
#[serde(untagged)]
enum UpstreamErrorRepr {
    Message(String),
    Object(Map<String, Value>),
    Other(Value),
}

const KNOWN_ERROR_FIELDS: [&str; 4] = ["message", "type", "kind", "data"];

fn string_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    object.get(key).and_then(Value::as_str).map(str::to_string)
}

impl From<UpstreamErrorRepr> for UpstreamError {
    fn from(repr: UpstreamErrorRepr) -> Self {
        match repr {
            UpstreamErrorRepr::Message(message) => Self::new(message),
            UpstreamErrorRepr::Object(mut object) => {
                let message = string_field(&object, "message")
                    .or_else(|| string_field(&object, "status"))
                    .unwrap_or_else(|| Value::Object(object.clone()).to_string());

                let kind = string_field(&object, "type").or_else(|| string_field(&object, "kind"));

                // Any field we do not model keeps the whole object as data.
                let data = if object.keys().all(|key| KNOWN_ERROR_FIELDS.contains(&key.as_str())) {
                    object.remove("data")
                } else {
                    Some(Value::Object(object))
                };

                Self { message, kind, data }
            }
            UpstreamErrorRepr::Other(value) => Self {
                message: value.to_string(),
                kind: None,
                data: Some(value),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_backend_events() {
        let events: Vec<UnifiedStreamEvent> = serde_json::from_value(json!([
            {"type": "start"},
            {"type": "text-delta", "id": "t1", "delta": "Hello"},
            {"type": "tool-call", "toolCallId": "call_1", "toolName": "get_weather", "input": {"location": "SF"}},
            {"type": "finish", "finishReason": "tool-calls", "totalUsage": {"inputTokens": 10, "outputTokens": 4}},
            {"type": "error", "error": "overloaded"}
        ]))
        .unwrap();

        assert_eq!(events[0], UnifiedStreamEvent::Unknown);
        assert_eq!(
            events[1],
            UnifiedStreamEvent::TextDelta {
                id: "t1".to_string(),
                text: "Hello".to_string()
            }
        );
        assert_eq!(
            events[3],
            UnifiedStreamEvent::Finish {
                finish_reason: FinishReason::ToolCalls,
                total_usage: Some(UnifiedUsage {
                    input_tokens: Some(10),
                    output_tokens: Some(4),
                    ..Default::default()
                }),
            }
        );
        assert_eq!(
            events[4],
            UnifiedStreamEvent::Error {
                error: UpstreamError::new("overloaded")
            }
        );
    }

    #[test]
    fn unknown_finish_reasons_are_tolerated() {
        let reason: FinishReason = serde_json::from_value(json!("pause-turn")).unwrap();
        assert_eq!(reason, FinishReason::Unknown);
    }

    #[test]
    fn structured_errors_keep_their_kind() {
        let error: UpstreamError = serde_json::from_value(json!({
            "message": "rate limited",
            "type": "rate_limit_error",
            "data": {"retryAfter": 3}
        }))
        .unwrap();

        assert_eq!(error.kind.as_deref(), Some("rate_limit_error"));
        assert_eq!(error.data, Some(json!({"retryAfter": 3})));
        assert_eq!(error.to_string(), "rate limited");
    }

    #[test]
    fn errors_without_a_message_still_abort() {
        let event: UnifiedStreamEvent = serde_json::from_value(json!({
            "type": "error",
            "error": {"code": 429, "status": "RESOURCE_EXHAUSTED"}
        }))
        .unwrap();

        let UnifiedStreamEvent::Error { error } = event else {
            unreachable!("expected an error event");
        };

        assert_eq!(error.message, "RESOURCE_EXHAUSTED");
        assert_eq!(error.kind, None);
        assert_eq!(error.data, Some(json!({"code": 429, "status": "RESOURCE_EXHAUSTED"})));
    }

    #[test]
    fn unmodelled_error_fields_are_kept() {
        let error: UpstreamError = serde_json::from_value(json!({"message": "x", "code": "rate_limit"})).unwrap();

        assert_eq!(error.message, "x");
        assert_eq!(
            serde_json::to_value(&error).unwrap(),
            json!({"message": "x", "data": {"message": "x", "code": "rate_limit"}})
        );

        let error: UpstreamError = serde_json::from_value(json!(503)).unwrap();

        assert_eq!(error.message, "503");
        assert_eq!(error.data, Some(json!(503)));
    }
}
