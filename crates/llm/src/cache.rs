use std::sync::Arc;

use config::CacheConfig;
use mini_moka::sync::Cache;
use serde_json::Value;

/// Key/value capability used to keep provider metadata (reasoning signatures)
/// of tool calls alive across requests.
///
/// Stream adapters store the metadata of every tool call they emit; converters
/// restore it when a client sends the call back without it. Neither side owns
/// the cache.
pub trait ReasoningCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;

    fn set(&self, key: String, value: Value);
}

/// In-memory [`ReasoningCache`] with a bounded size and a time-to-live.
pub struct MokaReasoningCache {
    cache: Cache<String, Value>,
}

impl MokaReasoningCache {
    pub fn new(config: &CacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_entries)
            .time_to_live(config.time_to_live)
            .build();

        Self { cache }
    }

    /// Builds the shared cache when it is enabled in the configuration.
    pub fn from_config(config: &CacheConfig) -> Option<Arc<dyn ReasoningCache>> {
        if !config.enabled {
            log::debug!("Reasoning cache disabled");
            return None;
        }

        Some(Arc::new(Self::new(config)))
    }
}

impl ReasoningCache for MokaReasoningCache {
    fn get(&self, key: &str) -> Option<Value> {
        self.cache.get(&key.to_string())
    }

    fn set(&self, key: String, value: Value) {
        self.cache.insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;

    #[test]
    fn stores_and_returns_values() {
        let cache = MokaReasoningCache::new(&CacheConfig::default());

        cache.set("call_1".to_string(), json!({"anthropic": {"signature": "sig"}}));

        assert_eq!(cache.get("call_1"), Some(json!({"anthropic": {"signature": "sig"}})));
        assert_eq!(cache.get("call_2"), None);
    }

    #[test]
    fn disabled_cache_is_not_built() {
        let config = CacheConfig {
            enabled: false,
            ..Default::default()
        };

        assert!(MokaReasoningCache::from_config(&config).is_none());
    }

    #[test]
    fn entries_expire() {
        let config = CacheConfig {
            time_to_live: Duration::from_millis(10),
            ..Default::default()
        };

        let cache = MokaReasoningCache::new(&config);
        cache.set("call_1".to_string(), json!(true));

        std::thread::sleep(Duration::from_millis(50));

        assert_eq!(cache.get("call_1"), None);
    }
}
