//! Reasoning controls mapped onto each model provider's own options.
//!
//! | control              | anthropic                     | google                                   | openai                 | deepseek          |
//! |----------------------|-------------------------------|------------------------------------------|------------------------|-------------------|
//! | effort `minimal`     | dropped                       | dropped                                  | `reasoningEffort`      | dropped           |
//! | effort low/med/high  | `thinking` enabled, budget    | `thinkingConfig` budget, include thoughts | `reasoningEffort`     | `thinking: true`  |
//! | thinking budget      | `thinking` enabled, budget    | `thinkingConfig` budget, include thoughts | effort from budget    | `thinking: true`  |
//! | thinking disabled    | `thinking` disabled           | `thinkingConfig` budget 0                | dropped                | `thinking: false` |
//!
//! Providers without a mapping get no options at all.

use config::ReasoningBudgets;
use serde_json::json;
use strum::{Display, EnumString};

use crate::unified::{ProviderKind, ProviderOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ReasoningEffort {
    Minimal,
    Low,
    Medium,
    High,
}

impl ReasoningEffort {
    fn budget(self, budgets: &ReasoningBudgets) -> Option<u32> {
        match self {
            Self::Minimal => None,
            Self::Low => Some(budgets.low),
            Self::Medium => Some(budgets.medium),
            Self::High => Some(budgets.high),
        }
    }

    fn from_budget(budget_tokens: u32, budgets: &ReasoningBudgets) -> Self {
        if budget_tokens <= budgets.low {
            Self::Low
        } else if budget_tokens <= budgets.medium {
            Self::Medium
        } else {
            Self::High
        }
    }
}

/// A format's reasoning control, normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThinkingControl {
    /// `reasoning_effort` / `reasoning.effort`.
    Effort(ReasoningEffort),
    /// `thinking: {type: enabled, budget_tokens}`.
    Enabled { budget_tokens: u32 },
    /// `thinking: {type: disabled}`.
    Disabled,
}

impl ThinkingControl {
    /// Parses an effort string. Unknown efforts yield `None`.
    pub fn effort(effort: &str) -> Option<Self> {
        match effort.parse() {
            Ok(effort) => Some(Self::Effort(effort)),
            Err(_) => {
                log::debug!("Ignoring unknown reasoning effort '{effort}'");
                None
            }
        }
    }
}

/// Maps a reasoning control onto the options of the target provider.
pub fn map_thinking(
    provider: &ProviderKind,
    control: ThinkingControl,
    budgets: &ReasoningBudgets,
) -> Option<ProviderOptions> {
    let budget = match control {
        ThinkingControl::Effort(effort) => effort.budget(budgets),
        ThinkingControl::Enabled { budget_tokens } => Some(budget_tokens),
        ThinkingControl::Disabled => None,
    };

    let options = match (provider, control, budget) {
        (ProviderKind::Anthropic, ThinkingControl::Disabled, _) => json!({"thinking": {"type": "disabled"}}),
        (ProviderKind::Anthropic, _, Some(budget)) => json!({"thinking": {"type": "enabled", "budgetTokens": budget}}),

        (ProviderKind::Google, ThinkingControl::Disabled, _) => json!({"thinkingConfig": {"thinkingBudget": 0}}),
        (ProviderKind::Google, _, Some(budget)) => json!({
            "thinkingConfig": {"thinkingBudget": budget, "includeThoughts": true}
        }),

        (ProviderKind::OpenAi, ThinkingControl::Effort(effort), _) => json!({"reasoningEffort": effort.to_string()}),
        (ProviderKind::OpenAi, ThinkingControl::Enabled { budget_tokens }, _) => {
            let effort = ReasoningEffort::from_budget(budget_tokens, budgets);
            json!({"reasoningEffort": effort.to_string()})
        }

        (ProviderKind::DeepSeek, ThinkingControl::Disabled, _) => json!({"thinking": false}),
        (ProviderKind::DeepSeek, _, Some(_)) => json!({"thinking": true}),

        (ProviderKind::Other(name), _, _) => {
            log::debug!("No reasoning mapping for provider '{name}', dropping {control:?}");
            return None;
        }

        // Minimal effort outside OpenAI, disabled thinking on OpenAI.
        _ => return None,
    };

    Some(ProviderOptions::for_provider(provider.as_str(), options))
}
