//! SMS gateway configuration

use serde::Deserialize;

/// Configuration for the external one-time-code delivery gateway.
#[derive(Debug, Deserialize, Clone)]
pub struct SmsConfig {
    /// Enable outbound delivery. When disabled, issued codes are only logged
    /// (default: false)
    #[serde(default)]
    pub enabled: bool,

    /// Gateway endpoint the delivery request is POSTed to
    #[serde(default)]
    pub gateway_url: String,

    /// Request timeout in seconds (default: 5)
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
}

fn default_request_timeout() -> u64 {
    5
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            gateway_url: String::new(),
            request_timeout: default_request_timeout(),
        }
    }
}
