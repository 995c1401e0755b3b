use thiserror::Error;

use crate::unified::UpstreamError;

pub type Result<T> = std::result::Result<T, LlmError>;

/// Errors surfaced by the protocol-adapter layer.
#[derive(Debug, Error)]
pub enum LlmError {
    /// No converter, adapter or formatter is registered for the format tag.
    #[error("Unsupported format '{format}', supported formats: {}", supported.join(", "))]
    UnsupportedFormat { format: String, supported: Vec<String> },

    /// The request body does not have the shape of the declared input format.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A vendor event could not be serialized for the wire.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// The neutral stream reported a fatal error.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl LlmError {
    /// Error message safe to return to the client.
    pub fn client_message(&self) -> String {
        match self {
            Self::Serialization(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<sonic_rs::Error> for LlmError {
    fn from(error: sonic_rs::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_format_lists_alternatives() {
        let error = LlmError::UnsupportedFormat {
            format: "gemini".to_string(),
            supported: vec!["anthropic".to_string(), "openai".to_string()],
        };

        insta::assert_snapshot!(error, @"Unsupported format 'gemini', supported formats: anthropic, openai");
    }

    #[test]
    fn upstream_errors_keep_their_message() {
        let error = LlmError::from(UpstreamError::new("overloaded"));

        assert_eq!(error.client_message(), "overloaded");
    }
}
