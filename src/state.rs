use crate::config::ServerConfig;
use crate::sms::SmsGateway;
use crate::store::{create_store, CredentialStore, Store, StoreError};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub store: Arc<Store>,
    pub sms: Arc<SmsGateway>,
}

impl AppState {
    /// Build the application state, creating the configured store backend.
    pub async fn new(config: ServerConfig) -> Result<Self, StoreError> {
        let store = create_store(&config).await?;
        Ok(Self::with_store(config, store))
    }

    /// Build the application state around an existing store instance.
    pub fn with_store(config: ServerConfig, store: Store) -> Self {
        let sms = SmsGateway::new(config.sms.clone());
        Self {
            config: Arc::new(config),
            store: Arc::new(store),
            sms: Arc::new(sms),
        }
    }

    /// Check if all components are healthy
    pub async fn health_check(&self) -> bool {
        self.store.health_check().await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_app_state_new() {
        let config = ServerConfig::for_test();
        let state = AppState::new(config.clone()).await.expect("state builds");
        assert_eq!(state.config.port, config.port);
        assert!(state.health_check().await);
    }

    #[tokio::test]
    async fn test_app_state_clone_shares_data() {
        let state = AppState::new(ServerConfig::for_test()).await.unwrap();
        let clone = state.clone();
        assert_eq!(Arc::as_ptr(&state.config), Arc::as_ptr(&clone.config));
        assert_eq!(Arc::as_ptr(&state.store), Arc::as_ptr(&clone.store));
    }
}
