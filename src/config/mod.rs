pub(crate) use crate::config::store::{StoreBackend, StoreConfig};
use crate::config::login::LoginConfig;
use crate::config::sms::SmsConfig;
use crate::config::tokens::TokenConfig;
use config::{Config as ConfigCrate, ConfigError};
use serde::Deserialize;

pub mod login;
pub mod sms;
pub mod store;
pub mod tokens;

/// Main configuration structure for the OAuth server.
///
/// Every field can be set through the environment with the `OAUTH_` prefix
/// and `__` as the nesting separator, e.g. `OAUTH_PORT=9000`,
/// `OAUTH_STORE__BACKEND=redis`, `OAUTH_TOKENS__ACCESS_TOKEN_TTL=600`.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Listen address (default: 0.0.0.0)
    #[serde(default = "default_host")]
    pub host: String,

    /// Listen port (default: 9000)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Session token signing configuration
    #[serde(default)]
    pub session: SessionConfig,

    /// Resource-owner login configuration
    #[serde(default)]
    pub login: LoginConfig,

    /// Token issuance configuration
    #[serde(default)]
    pub tokens: TokenConfig,

    /// Credential store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// SMS delivery gateway configuration
    #[serde(default)]
    pub sms: SmsConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            session: SessionConfig::default(),
            login: LoginConfig::default(),
            tokens: TokenConfig::default(),
            store: StoreConfig::default(),
            sms: SmsConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Creates a new configuration instance from environment variables.
    pub fn new() -> Result<Self, String> {
        ConfigCrate::builder()
            .add_source(
                config::Environment::with_prefix("OAUTH")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .map_err(|e: ConfigError| e.to_string())?
            .try_deserialize()
            .map_err(|e| e.to_string())
    }

    #[cfg(test)]
    pub fn for_test() -> Self {
        Self {
            port: 0, // let the OS choose a port
            session: SessionConfig {
                secret: "test-session-secret".to_string(),
                ttl: 3600,
            },
            ..Default::default()
        }
    }
}

/// Signing configuration for the stateless session cookie.
#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    /// HMAC secret the session token is signed with
    #[serde(default = "default_session_secret")]
    pub secret: String,

    /// Session token lifetime in seconds (default: 1 hour)
    #[serde(default = "default_session_ttl")]
    pub ttl: u64,
}

fn default_session_secret() -> String {
    "superupersessionsecret".to_string()
}

fn default_session_ttl() -> u64 {
    3600
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: default_session_secret(),
            ttl: default_session_ttl(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::login::LoginMode;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.session.ttl, 3600);
        assert_eq!(config.login.mode, LoginMode::Password);
        assert_eq!(config.login.one_time_code_ttl, 300);
        assert_eq!(config.tokens.access_token_ttl, 3600);
        assert_eq!(config.tokens.refresh_token_ttl, 604_800);
        assert_eq!(config.tokens.code_ttl, 300);
        assert!(!config.tokens.scope_enforced);
        assert!(config.tokens.allow_bearer_in_query);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.store.redis.url, "");
        assert!(!config.sms.enabled);
    }

    #[test]
    fn test_config_from_env() {
        // Single combined test: the process environment is shared between
        // test threads, so per-field tests would race each other.
        std::env::set_var("OAUTH_PORT", "9100");
        std::env::set_var("OAUTH_STORE__BACKEND", "redis");
        std::env::set_var("OAUTH_STORE__REDIS__URL", "redis://localhost:6379");
        std::env::set_var("OAUTH_TOKENS__ACCESS_TOKEN_TTL", "120");
        std::env::set_var("OAUTH_SESSION__SECRET", "from-env");

        let config = ServerConfig::new().unwrap();
        assert_eq!(config.port, 9100);
        assert_eq!(config.store.backend, StoreBackend::Redis);
        assert_eq!(config.store.redis.url, "redis://localhost:6379");
        assert_eq!(config.tokens.access_token_ttl, 120);
        assert_eq!(config.session.secret, "from-env");
        // Untouched fields keep their defaults.
        assert_eq!(config.tokens.refresh_token_ttl, 604_800);

        std::env::remove_var("OAUTH_PORT");
        std::env::remove_var("OAUTH_STORE__BACKEND");
        std::env::remove_var("OAUTH_STORE__REDIS__URL");
        std::env::remove_var("OAUTH_TOKENS__ACCESS_TOKEN_TTL");
        std::env::remove_var("OAUTH_SESSION__SECRET");
    }
}
