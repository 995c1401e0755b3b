use serde::Deserialize;

/// Output formats that always have an adapter registered.
pub const BUILTIN_FORMATS: [&str; 3] = ["openai", "anthropic", "openai-responses"];

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StreamingConfig {
    /// Model id reported in streamed responses when the caller does not name one.
    pub default_model: String,
    /// Output format used when the caller does not pick one.
    pub default_output: String,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            default_model: "unknown".to_string(),
            default_output: "anthropic".to_string(),
        }
    }
}
