//! Resource-owner login configuration

use serde::Deserialize;

/// How resource owners authenticate at `/login`. The two modes are mutually
/// exclusive deployment choices, never combined per request.
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LoginMode {
    /// Phone number + delivered one-time code
    OneTimeCode,
    /// Username + password
    #[serde(other)]
    #[default]
    Password,
}

/// Login configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoginConfig {
    /// Login mode: "password" (default) or "one-time-code"
    #[serde(default)]
    pub mode: LoginMode,

    /// Validity window of a one-time login code in seconds, measured from
    /// issuance (default: 300 = 5 minutes)
    #[serde(default = "default_one_time_code_ttl")]
    pub one_time_code_ttl: u64,
}

fn default_one_time_code_ttl() -> u64 {
    300
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            mode: LoginMode::Password,
            one_time_code_ttl: default_one_time_code_ttl(),
        }
    }
}
