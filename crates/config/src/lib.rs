mod cache;
mod conversion;
mod error;
mod loader;
mod streaming;

use std::path::Path;

use serde::Deserialize;

pub use cache::CacheConfig;
pub use conversion::{ConversionConfig, ReasoningBudgets};
pub use error::Error;
pub use streaming::{BUILTIN_FORMATS, StreamingConfig};

pub type Result<T> = std::result::Result<T, error::Error>;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Request conversion settings.
    pub conversion: ConversionConfig,
    /// Output stream settings.
    pub streaming: StreamingConfig,
    /// Reasoning continuity cache.
    pub cache: CacheConfig,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> crate::Result<Config> {
        loader::load(path)
    }

    /// Parses a configuration from TOML text and validates it.
    pub fn from_toml(content: &str) -> crate::Result<Config> {
        let config: Config = toml::from_str(content)?;
        loader::validate(&config)?;

        Ok(config)
    }
}
