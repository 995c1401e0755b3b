use std::time::Duration;

use duration_str::deserialize_duration;
use serde::Deserialize;

/// In-memory cache remembering reasoning signatures attached to tool calls, so
/// they can be restored when a client sends the conversation back without them.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: u64,
    #[serde(deserialize_with = "deserialize_duration")]
    pub time_to_live: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 10_000,
            time_to_live: Duration::from_secs(60 * 60),
        }
    }
}
