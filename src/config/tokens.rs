//! Token issuance configuration

use serde::Deserialize;

/// Server-wide token issuance settings. Per-client lifetimes take precedence
/// over the TTL defaults here.
#[derive(Debug, Deserialize, Clone)]
pub struct TokenConfig {
    /// Access token lifetime in seconds when the client has none configured
    /// (default: 3600 = 1 hour)
    #[serde(default = "default_access_token_ttl")]
    pub access_token_ttl: u64,

    /// Refresh token lifetime in seconds when the client has none configured
    /// (default: 604800 = 1 week)
    #[serde(default = "default_refresh_token_ttl")]
    pub refresh_token_ttl: u64,

    /// Authorization code lifetime in seconds (default: 300 = 5 minutes)
    #[serde(default = "default_code_ttl")]
    pub code_ttl: u64,

    /// Enable per-route scope checks on protected resources. When disabled
    /// the deployment has no scope model and every valid bearer token is
    /// authorized (default: false)
    #[serde(default)]
    pub scope_enforced: bool,

    /// Accept bearer tokens from the `access_token` query parameter in
    /// addition to the Authorization header (default: true)
    #[serde(default = "default_allow_bearer_in_query")]
    pub allow_bearer_in_query: bool,
}

fn default_access_token_ttl() -> u64 {
    3600
}

fn default_refresh_token_ttl() -> u64 {
    604_800
}

fn default_code_ttl() -> u64 {
    300
}

fn default_allow_bearer_in_query() -> bool {
    true
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            access_token_ttl: default_access_token_ttl(),
            refresh_token_ttl: default_refresh_token_ttl(),
            code_ttl: default_code_ttl(),
            scope_enforced: false,
            allow_bearer_in_query: default_allow_bearer_in_query(),
        }
    }
}
