use std::path::Path;

use crate::{BUILTIN_FORMATS, Config, error::Error};

pub fn load<P: AsRef<Path>>(path: P) -> crate::Result<Config> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;

    validate(&config)?;

    log::debug!("Loaded configuration from {}", path.display());

    Ok(config)
}

pub(crate) fn validate(config: &Config) -> crate::Result<()> {
    let budgets = &config.conversion.reasoning_budgets;

    if !(budgets.low < budgets.medium && budgets.medium < budgets.high) {
        return Err(Error::Validation {
            path: "conversion.reasoning_budgets",
            reason: format!(
                "budgets must be strictly increasing, got low = {}, medium = {}, high = {}",
                budgets.low, budgets.medium, budgets.high
            ),
        });
    }

    if config.conversion.unknown_tool_name.trim().is_empty() {
        return Err(Error::Validation {
            path: "conversion.unknown_tool_name",
            reason: "must not be empty".to_string(),
        });
    }

    if !BUILTIN_FORMATS.contains(&config.streaming.default_output.as_str()) {
        return Err(Error::Validation {
            path: "streaming.default_output",
            reason: format!(
                "unknown format '{}', expected one of {}",
                config.streaming.default_output,
                BUILTIN_FORMATS.join(", ")
            ),
        });
    }

    if config.cache.enabled && config.cache.max_entries == 0 {
        return Err(Error::Validation {
            path: "cache.max_entries",
            reason: "must be greater than zero when the cache is enabled".to_string(),
        });
    }

    if config.cache.enabled && config.cache.time_to_live.is_zero() {
        log::warn!("cache.time_to_live is zero, cached reasoning signatures expire immediately");
    }

    Ok(())
}
