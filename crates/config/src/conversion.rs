use serde::Deserialize;

/// Settings of the request converters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConversionConfig {
    /// Tool name given to tool results whose call id matches no earlier tool call.
    pub unknown_tool_name: String,
    /// Thinking budgets behind the `low` / `medium` / `high` reasoning efforts.
    pub reasoning_budgets: ReasoningBudgets,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            unknown_tool_name: "unknown_tool".to_string(),
            reasoning_budgets: ReasoningBudgets::default(),
        }
    }
}

/// Token budgets for each reasoning effort. Also used in reverse, to pick an
/// effort for a given thinking budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReasoningBudgets {
    pub low: u32,
    pub medium: u32,
    pub high: u32,
}

impl Default for ReasoningBudgets {
    fn default() -> Self {
        Self {
            low: 1024,
            medium: 8192,
            high: 24576,
        }
    }
}
