use super::{resolve_token_refs, CredentialStore, StoreError};
use crate::models::{revoked_sentinel, AuthorizationCode, Client, ResolvedToken, Token, User};
use async_trait::async_trait;
use chrono::Utc;
use log::error;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{AsyncCommands, Client as RedisClient};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

fn client_key(id: &str) -> String {
    format!("oauth:client:{id}")
}

fn user_key(id: &str) -> String {
    format!("oauth:user:id:{id}")
}

fn username_key(username: &str) -> String {
    format!("oauth:user:name:{username}")
}

fn access_token_key(token: &str) -> String {
    format!("oauth:token:access:{token}")
}

fn refresh_token_key(token: &str) -> String {
    format!("oauth:token:refresh:{token}")
}

fn code_key(code: &str) -> String {
    format!("oauth:code:{code}")
}

/// Redis-backed credential store.
///
/// Entities are stored as JSON values under namespaced keys, with a
/// refresh-token index pointing at the access-token key. Single-use
/// consumption relies on `GETDEL`, which removes and returns in one round
/// trip; the configured response timeout turns a stalled server into a
/// retryable store error instead of a hung request.
#[derive(Clone)]
pub struct RedisStore {
    conn_manager: ConnectionManager,
}

impl RedisStore {
    /// Initialize a new Redis store instance
    pub async fn new(redis_url: &str, response_timeout_secs: u64) -> Result<Self, String> {
        let client = match RedisClient::open(redis_url) {
            Ok(client) => client,
            Err(err) => {
                return Err(format!("Failed to connect to Redis: {}", err));
            }
        };

        let config = ConnectionManagerConfig::new()
            .set_connection_timeout(Duration::from_secs(2))
            .set_response_timeout(Duration::from_secs(response_timeout_secs));

        let conn_manager = match ConnectionManager::new_with_config(client, config).await {
            Ok(manager) => manager,
            Err(err) => {
                return Err(format!("Failed to create Redis connection manager: {}", err));
            }
        };

        // Test the connection to ensure it's working
        let mut conn = conn_manager.clone();
        if let Err(err) = redis::cmd("PING").query_async::<String>(&mut conn).await {
            return Err(format!("Failed to ping Redis: {}", err));
        }

        Ok(Self { conn_manager })
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let mut conn = self.conn_manager.clone();
        let value: Option<String> = match conn.get(key).await {
            Ok(value) => value,
            Err(err) => {
                if err.kind() == redis::ErrorKind::TypeError {
                    // Key doesn't exist
                    return Ok(None);
                }
                error!("Redis error while getting key {}: {}", key, err);
                return Err(StoreError::Redis(err.to_string()));
            }
        };
        match value {
            Some(value) => serde_json::from_str(&value)
                .map_err(|e| StoreError::Deserialization(e.to_string()))
                .map(Some),
            None => Ok(None),
        }
    }

    async fn set_json<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let serialized = serde_json::to_string(value)?;
        let mut conn = self.conn_manager.clone();
        conn.set::<_, _, ()>(key, serialized).await.map_err(|err| {
            error!("Redis error while setting key {}: {}", key, err);
            StoreError::Redis(err.to_string())
        })
    }

    async fn set_json_ex<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: u64,
    ) -> Result<(), StoreError> {
        let serialized = serde_json::to_string(value)?;
        let mut conn = self.conn_manager.clone();
        conn.set_ex::<_, _, ()>(key, serialized, ttl_secs)
            .await
            .map_err(|err| {
                error!("Redis error while setting key {}: {}", key, err);
                StoreError::Redis(err.to_string())
            })
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn_manager.clone();
        conn.get(key).await.map_err(|err| {
            error!("Redis error while getting key {}: {}", key, err);
            StoreError::Redis(err.to_string())
        })
    }

    /// Atomically remove a key and return its previous value.
    async fn take_string(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn_manager.clone();
        conn.get_del(key).await.map_err(|err| {
            error!("Redis error while taking key {}: {}", key, err);
            StoreError::Redis(err.to_string())
        })
    }

    async fn resolve(&self, token: Token) -> Result<Option<ResolvedToken>, StoreError> {
        let client: Option<Client> = self.get_json(&client_key(&token.client_id)).await?;
        let user: Option<User> = self.get_json(&user_key(&token.user_id)).await?;
        Ok(resolve_token_refs(token, client, user))
    }

    /// Remaining lifetime of the whole pair, used as the storage TTL backstop.
    fn pair_ttl_secs(token: &Token) -> u64 {
        let expires_at = token
            .refresh_token_expires_at
            .unwrap_or(token.access_token_expires_at);
        (expires_at - Utc::now()).num_seconds().max(1) as u64
    }
}

#[async_trait]
impl CredentialStore for RedisStore {
    async fn get_client(
        &self,
        id: &str,
        secret: Option<&str>,
    ) -> Result<Option<Client>, StoreError> {
        let client: Option<Client> = self.get_json(&client_key(id)).await?;
        Ok(client.filter(|client| match secret {
            Some(secret) => client.secret.as_deref() == Some(secret),
            None => true,
        }))
    }

    async fn update_client(&self, client: &Client) -> Result<(), StoreError> {
        let existing: Option<Client> = self.get_json(&client_key(&client.id)).await?;
        if existing.is_none() {
            error!("Client {} not found when updating", client.id);
            return Ok(());
        }
        self.set_json(&client_key(&client.id), client).await
    }

    async fn get_user(
        &self,
        username: &str,
        credential: &str,
    ) -> Result<Option<User>, StoreError> {
        let Some(id) = self.get_string(&username_key(username)).await? else {
            return Ok(None);
        };
        let user: Option<User> = self.get_json(&user_key(&id)).await?;
        Ok(user.filter(|user| user.credential == credential))
    }

    async fn get_user_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        self.get_json(&user_key(id)).await
    }

    async fn add_user(&self, username: &str, credential: &str) -> Result<User, StoreError> {
        let existing_id = self.get_string(&username_key(username)).await?;
        let user = User {
            id: existing_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            username: username.to_string(),
            credential: credential.to_string(),
            timestamp: Utc::now(),
            is_client: false,
        };
        self.set_json(&user_key(&user.id), &user).await?;
        let mut conn = self.conn_manager.clone();
        conn.set::<_, _, ()>(&username_key(username), &user.id)
            .await
            .map_err(|err| StoreError::Redis(err.to_string()))?;
        Ok(user)
    }

    async fn get_access_token(
        &self,
        access_token: &str,
    ) -> Result<Option<ResolvedToken>, StoreError> {
        let Some(token) = self
            .get_json::<Token>(&access_token_key(access_token))
            .await?
        else {
            return Ok(None);
        };
        self.resolve(token).await
    }

    async fn get_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<Option<ResolvedToken>, StoreError> {
        let Some(access_token) = self.get_string(&refresh_token_key(refresh_token)).await? else {
            return Ok(None);
        };
        let Some(token) = self
            .get_json::<Token>(&access_token_key(&access_token))
            .await?
        else {
            return Ok(None);
        };
        self.resolve(token).await
    }

    async fn save_token(&self, token: &Token) -> Result<(), StoreError> {
        let ttl = Self::pair_ttl_secs(token);
        self.set_json_ex(&access_token_key(&token.access_token), token, ttl)
            .await?;
        if let Some(refresh_token) = &token.refresh_token {
            let mut conn = self.conn_manager.clone();
            conn.set_ex::<_, _, ()>(
                &refresh_token_key(refresh_token),
                &token.access_token,
                ttl,
            )
            .await
            .map_err(|err| StoreError::Redis(err.to_string()))?;
        }
        Ok(())
    }

    async fn revoke_token(&self, refresh_token: &str) -> Result<Option<Token>, StoreError> {
        // The index removal is the linearization point: of two concurrent
        // revocations only one sees the access-token key.
        let Some(access_token) = self.take_string(&refresh_token_key(refresh_token)).await? else {
            return Ok(None);
        };
        let Some(value) = self.take_string(&access_token_key(&access_token)).await? else {
            return Ok(None);
        };
        let mut token: Token = serde_json::from_str(&value)
            .map_err(|e| StoreError::Deserialization(e.to_string()))?;
        token.refresh_token_expires_at = Some(revoked_sentinel());
        Ok(Some(token))
    }

    async fn get_authorization_code(
        &self,
        code: &str,
    ) -> Result<Option<AuthorizationCode>, StoreError> {
        self.get_json(&code_key(code)).await
    }

    async fn save_authorization_code(&self, code: &AuthorizationCode) -> Result<(), StoreError> {
        let ttl = (code.expires_at - Utc::now()).num_seconds().max(1) as u64;
        self.set_json_ex(&code_key(&code.code), code, ttl).await
    }

    async fn take_authorization_code(
        &self,
        code: &str,
    ) -> Result<Option<AuthorizationCode>, StoreError> {
        match self.take_string(&code_key(code)).await? {
            Some(value) => serde_json::from_str(&value)
                .map_err(|e| StoreError::Deserialization(e.to_string()))
                .map(Some),
            None => Ok(None),
        }
    }

    async fn health_check(&self) -> Result<(), String> {
        let mut conn = self.conn_manager.clone();
        match redis::cmd("PING").query_async::<String>(&mut conn).await {
            Ok(_) => Ok(()),
            Err(err) => Err(format!("Redis health check failed: {}", err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GrantType;
    use chrono::Duration as ChronoDuration;
    use redis_test::server::RedisServer;

    fn get_redis_url(server: &RedisServer) -> String {
        match &server.addr {
            redis::ConnectionAddr::Tcp(host, port) => {
                format!("redis://{}:{}/", host, port)
            }
            _ => "redis://127.0.0.1:6379/".to_string(),
        }
    }

    fn test_client() -> Client {
        Client {
            id: "c1".to_string(),
            secret: Some("123456".to_string()),
            name: "test client".to_string(),
            access_token_lifetime: None,
            refresh_token_lifetime: None,
            redirect_uris: vec![],
            grants: vec![GrantType::AuthorizationCode],
            valid_scopes: vec![],
        }
    }

    #[tokio::test]
    #[ignore]
    async fn test_redis_store_token_round_trip() {
        let server = RedisServer::new();
        let store = RedisStore::new(&get_redis_url(&server), 5).await.unwrap();

        store
            .set_json(&client_key("c1"), &test_client())
            .await
            .unwrap();
        let user = store.add_user("wangbo@xiaoda.ai", "00AAaa").await.unwrap();

        let token = Token {
            access_token: "access-1".to_string(),
            refresh_token: Some("refresh-1".to_string()),
            access_token_expires_at: Utc::now() + ChronoDuration::seconds(3600),
            refresh_token_expires_at: Some(Utc::now() + ChronoDuration::seconds(604_800)),
            client_id: "c1".to_string(),
            user_id: user.id.clone(),
            scope: None,
        };
        store.save_token(&token).await.unwrap();

        let resolved = store.get_access_token("access-1").await.unwrap().unwrap();
        assert_eq!(resolved.user.username, "wangbo@xiaoda.ai");

        let revoked = store.revoke_token("refresh-1").await.unwrap().unwrap();
        assert!(revoked.refresh_token_expires_at.unwrap() < Utc::now());
        assert!(store.revoke_token("refresh-1").await.unwrap().is_none());
        assert!(store.get_access_token("access-1").await.unwrap().is_none());
    }

    #[tokio::test]
    #[ignore]
    async fn test_redis_store_code_single_use() {
        let server = RedisServer::new();
        let store = RedisStore::new(&get_redis_url(&server), 5).await.unwrap();

        let code = AuthorizationCode {
            code: "code-1".to_string(),
            expires_at: Utc::now() + ChronoDuration::seconds(300),
            client_id: "c1".to_string(),
            user_id: "1".to_string(),
            scope: None,
            redirect_uri: "https://cb".to_string(),
        };
        store.save_authorization_code(&code).await.unwrap();

        assert!(store
            .take_authorization_code("code-1")
            .await
            .unwrap()
            .is_some());
        assert!(store
            .take_authorization_code("code-1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    #[ignore]
    async fn test_redis_store_health_check() {
        let server = RedisServer::new();
        let store = RedisStore::new(&get_redis_url(&server), 5).await.unwrap();
        assert!(store.health_check().await.is_ok());
    }
}
