use crate::models::{revoked_sentinel, AuthorizationCode, Client, ResolvedToken, Token, User};
use thiserror::Error;

pub mod memory;
pub mod redis;

/// Errors that can occur during credential store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to serialize value: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Failed to parse value: {0}")]
    Deserialization(String),
    #[error("Redis error: {0}")]
    Redis(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Persistence contract for clients, users, authorization codes and tokens.
///
/// The store owns no business logic; every operation is an idempotent read or
/// a single-entity write, and implementations must be safe under concurrent
/// callers without cross-operation coordination. The `take_*`/`revoke_*`
/// operations are the one place atomicity matters: they must remove and
/// return the prior record in a single step so a code or refresh token can
/// never be redeemed twice.
#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look up a client by id, additionally checking the shared secret when
    /// one is presented. The secretless form serves the grant flows where the
    /// secret is not re-presented (authorization_code, refresh_token).
    async fn get_client(&self, id: &str, secret: Option<&str>)
        -> Result<Option<Client>, StoreError>;

    /// Replace the stored client record (last-writer-wins). Logs and returns
    /// without error when the client no longer exists.
    async fn update_client(&self, client: &Client) -> Result<(), StoreError>;

    /// Look up a user by username and credential.
    async fn get_user(&self, username: &str, credential: &str)
        -> Result<Option<User>, StoreError>;

    /// Look up a user by id.
    async fn get_user_by_id(&self, id: &str) -> Result<Option<User>, StoreError>;

    /// Upsert a user: an existing record keeps its id but gets the new
    /// credential and a fresh timestamp; otherwise a record is created under
    /// a newly assigned id.
    async fn add_user(&self, username: &str, credential: &str) -> Result<User, StoreError>;

    /// Resolve an access token string into the stored token with its weak
    /// user/client references rehydrated. A dangling reference resolves to
    /// `None`.
    async fn get_access_token(&self, access_token: &str)
        -> Result<Option<ResolvedToken>, StoreError>;

    /// Resolve a refresh token string the same way `get_access_token` does.
    async fn get_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<Option<ResolvedToken>, StoreError>;

    /// Persist a new token pair. Only the weak `client_id`/`user_id`
    /// references are stored, never embedded entities.
    async fn save_token(&self, token: &Token) -> Result<(), StoreError>;

    /// Atomically remove the token pair matched by refresh token value.
    /// Returns the removed pair with its refresh expiry stamped to the past
    /// sentinel, or `None` when no such token exists (including when a
    /// concurrent revocation won the race).
    async fn revoke_token(&self, refresh_token: &str) -> Result<Option<Token>, StoreError>;

    /// Look up an authorization code without consuming it.
    async fn get_authorization_code(
        &self,
        code: &str,
    ) -> Result<Option<AuthorizationCode>, StoreError>;

    /// Persist a newly issued authorization code (weak references only).
    async fn save_authorization_code(&self, code: &AuthorizationCode) -> Result<(), StoreError>;

    /// Atomically fetch-and-remove an authorization code, enforcing single
    /// use: of any number of concurrent redemptions exactly one receives the
    /// record. The returned record keeps its true expiry so the caller can
    /// still validate it.
    async fn take_authorization_code(
        &self,
        code: &str,
    ) -> Result<Option<AuthorizationCode>, StoreError>;

    /// Remove an authorization code, returning the tombstoned record
    /// (past-sentinel expiry) or `None` when it was already gone.
    async fn revoke_authorization_code(
        &self,
        code: &str,
    ) -> Result<Option<AuthorizationCode>, StoreError> {
        Ok(self.take_authorization_code(code).await?.map(|mut code| {
            code.expires_at = revoked_sentinel();
            code
        }))
    }

    /// Performs a deep health check on the store backend.
    async fn health_check(&self) -> Result<(), String>;
}

/// Store implementation that provides a uniform interface regardless of
/// backend. The concrete implementation is chosen at startup from the
/// configuration, never by conditional logic in callers.
#[derive(Clone)]
pub enum Store {
    /// In-memory tables, for development and tests
    Memory(memory::MemoryStore),
    /// Redis-backed store for production deployments
    Redis(redis::RedisStore),
}

#[async_trait::async_trait]
impl CredentialStore for Store {
    async fn get_client(
        &self,
        id: &str,
        secret: Option<&str>,
    ) -> Result<Option<Client>, StoreError> {
        match self {
            Self::Memory(store) => store.get_client(id, secret).await,
            Self::Redis(store) => store.get_client(id, secret).await,
        }
    }

    async fn update_client(&self, client: &Client) -> Result<(), StoreError> {
        match self {
            Self::Memory(store) => store.update_client(client).await,
            Self::Redis(store) => store.update_client(client).await,
        }
    }

    async fn get_user(
        &self,
        username: &str,
        credential: &str,
    ) -> Result<Option<User>, StoreError> {
        match self {
            Self::Memory(store) => store.get_user(username, credential).await,
            Self::Redis(store) => store.get_user(username, credential).await,
        }
    }

    async fn get_user_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        match self {
            Self::Memory(store) => store.get_user_by_id(id).await,
            Self::Redis(store) => store.get_user_by_id(id).await,
        }
    }

    async fn add_user(&self, username: &str, credential: &str) -> Result<User, StoreError> {
        match self {
            Self::Memory(store) => store.add_user(username, credential).await,
            Self::Redis(store) => store.add_user(username, credential).await,
        }
    }

    async fn get_access_token(
        &self,
        access_token: &str,
    ) -> Result<Option<ResolvedToken>, StoreError> {
        match self {
            Self::Memory(store) => store.get_access_token(access_token).await,
            Self::Redis(store) => store.get_access_token(access_token).await,
        }
    }

    async fn get_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<Option<ResolvedToken>, StoreError> {
        match self {
            Self::Memory(store) => store.get_refresh_token(refresh_token).await,
            Self::Redis(store) => store.get_refresh_token(refresh_token).await,
        }
    }

    async fn save_token(&self, token: &Token) -> Result<(), StoreError> {
        match self {
            Self::Memory(store) => store.save_token(token).await,
            Self::Redis(store) => store.save_token(token).await,
        }
    }

    async fn revoke_token(&self, refresh_token: &str) -> Result<Option<Token>, StoreError> {
        match self {
            Self::Memory(store) => store.revoke_token(refresh_token).await,
            Self::Redis(store) => store.revoke_token(refresh_token).await,
        }
    }

    async fn get_authorization_code(
        &self,
        code: &str,
    ) -> Result<Option<AuthorizationCode>, StoreError> {
        match self {
            Self::Memory(store) => store.get_authorization_code(code).await,
            Self::Redis(store) => store.get_authorization_code(code).await,
        }
    }

    async fn save_authorization_code(&self, code: &AuthorizationCode) -> Result<(), StoreError> {
        match self {
            Self::Memory(store) => store.save_authorization_code(code).await,
            Self::Redis(store) => store.save_authorization_code(code).await,
        }
    }

    async fn take_authorization_code(
        &self,
        code: &str,
    ) -> Result<Option<AuthorizationCode>, StoreError> {
        match self {
            Self::Memory(store) => store.take_authorization_code(code).await,
            Self::Redis(store) => store.take_authorization_code(code).await,
        }
    }

    async fn health_check(&self) -> Result<(), String> {
        match self {
            Self::Memory(store) => store.health_check().await,
            Self::Redis(store) => store.health_check().await,
        }
    }
}

/// Factory function to create the appropriate store implementation based on
/// configuration.
pub async fn create_store(config: &crate::config::ServerConfig) -> Result<Store, StoreError> {
    match config.store.backend {
        crate::config::StoreBackend::Memory => {
            let store = memory::MemoryStore::new();
            if config.store.seed_demo {
                store.seed_demo();
            }
            Ok(Store::Memory(store))
        }
        crate::config::StoreBackend::Redis => {
            if config.store.redis.url.is_empty() {
                return Err(StoreError::Config(
                    "Redis URL is required for the Redis store".to_string(),
                ));
            }
            let store = redis::RedisStore::new(
                &config.store.redis.url,
                config.store.redis.response_timeout,
            )
            .await
            .map_err(StoreError::Config)?;
            Ok(Store::Redis(store))
        }
    }
}

/// Rehydrate a token's weak references into full entities.
///
/// Tokens issued under the client_credentials grant reference the client
/// itself as their user; those resolve to the pseudo-user without a directory
/// record backing them.
pub(crate) fn resolve_token_refs(
    token: Token,
    client: Option<Client>,
    user: Option<User>,
) -> Option<ResolvedToken> {
    let client = client?;
    let user = match user {
        Some(user) => user,
        None if token.user_id == client.id => User::from_client(&client),
        None => return None,
    };
    Some(ResolvedToken {
        token,
        user,
        client,
    })
}
