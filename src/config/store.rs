use serde::Deserialize;

/// Specifies which credential store implementation to use
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StoreBackend {
    Redis,
    #[serde(other)]
    #[default]
    Memory,
}

/// Configuration for the credential store subsystem
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Store backend: "memory" (default) or "redis"
    #[serde(default)]
    pub backend: StoreBackend,

    /// Seed the memory backend with the demo client/user fixtures
    #[serde(default)]
    pub seed_demo: bool,

    /// Redis store specific configuration
    #[serde(default)]
    pub redis: RedisStoreConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            seed_demo: false,
            redis: RedisStoreConfig::default(),
        }
    }
}

/// Redis store configuration options
#[derive(Debug, Deserialize, Clone)]
pub struct RedisStoreConfig {
    /// Redis connection string
    #[serde(default)]
    pub url: String,

    /// Per-operation response timeout in seconds (default: 5); operations
    /// exceeding it fail with a retryable store error
    #[serde(default = "default_response_timeout")]
    pub response_timeout: u64,
}

fn default_response_timeout() -> u64 {
    5
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            response_timeout: default_response_timeout(),
        }
    }
}
