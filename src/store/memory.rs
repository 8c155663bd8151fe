use super::{resolve_token_refs, CredentialStore, StoreError};
use crate::models::{
    revoked_sentinel, AuthorizationCode, Client, GrantType, ResolvedToken, Token, User,
};
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, error};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Default)]
struct Tables {
    clients: HashMap<String, Client>,
    /// Users keyed by id; username lookups scan, like the original flat
    /// in-memory tables this backend replaces.
    users: HashMap<String, User>,
    /// Token pairs keyed by access token value.
    tokens: HashMap<String, Token>,
    codes: HashMap<String, AuthorizationCode>,
}

/// In-memory credential store for development and tests.
///
/// Every operation takes the table lock exactly once, so the removal
/// operations are naturally atomic take-and-return units.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a client record. Client provisioning is an
    /// out-of-band concern, so this lives outside the store contract.
    pub fn insert_client(&self, client: Client) {
        let mut tables = self.tables.write().expect("credential store lock poisoned");
        tables.clients.insert(client.id.clone(), client);
    }

    /// Insert or replace a user record verbatim, timestamp included.
    pub fn insert_user(&self, user: User) {
        let mut tables = self.tables.write().expect("credential store lock poisoned");
        tables.users.insert(user.id.clone(), user);
    }

    /// Seed the demo client and resource owner used by the development
    /// deployment.
    pub fn seed_demo(&self) {
        self.insert_client(Client {
            id: "xiaomi".to_string(),
            secret: Some("123456".to_string()),
            name: "xiao mi ai audio device".to_string(),
            access_token_lifetime: Some(3600),
            refresh_token_lifetime: Some(604_800),
            redirect_uris: vec![],
            grants: vec![
                GrantType::ClientCredentials,
                GrantType::RefreshToken,
                GrantType::AuthorizationCode,
                GrantType::Password,
            ],
            valid_scopes: vec!["course".to_string()],
        });
        self.insert_user(User {
            id: "1".to_string(),
            username: "wangbo@xiaoda.ai".to_string(),
            credential: "00AAaa".to_string(),
            timestamp: Utc::now(),
            is_client: false,
        });
        debug!("Seeded demo client and user");
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn get_client(
        &self,
        id: &str,
        secret: Option<&str>,
    ) -> Result<Option<Client>, StoreError> {
        let tables = self.tables.read().expect("credential store lock poisoned");
        let client = tables.clients.get(id).filter(|client| match secret {
            Some(secret) => client.secret.as_deref() == Some(secret),
            None => true,
        });
        Ok(client.cloned())
    }

    async fn update_client(&self, client: &Client) -> Result<(), StoreError> {
        let mut tables = self.tables.write().expect("credential store lock poisoned");
        if !tables.clients.contains_key(&client.id) {
            error!("Client {} not found when updating", client.id);
            return Ok(());
        }
        tables.clients.insert(client.id.clone(), client.clone());
        Ok(())
    }

    async fn get_user(
        &self,
        username: &str,
        credential: &str,
    ) -> Result<Option<User>, StoreError> {
        let tables = self.tables.read().expect("credential store lock poisoned");
        let user = tables
            .users
            .values()
            .find(|user| user.username == username && user.credential == credential);
        Ok(user.cloned())
    }

    async fn get_user_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.read().expect("credential store lock poisoned");
        Ok(tables.users.get(id).cloned())
    }

    async fn add_user(&self, username: &str, credential: &str) -> Result<User, StoreError> {
        let mut tables = self.tables.write().expect("credential store lock poisoned");
        let existing_id = tables
            .users
            .values()
            .find(|user| user.username == username)
            .map(|user| user.id.clone());

        let user = User {
            id: existing_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            username: username.to_string(),
            credential: credential.to_string(),
            timestamp: Utc::now(),
            is_client: false,
        };
        tables.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn get_access_token(
        &self,
        access_token: &str,
    ) -> Result<Option<ResolvedToken>, StoreError> {
        let tables = self.tables.read().expect("credential store lock poisoned");
        let Some(token) = tables.tokens.get(access_token).cloned() else {
            return Ok(None);
        };
        let client = tables.clients.get(&token.client_id).cloned();
        let user = tables.users.get(&token.user_id).cloned();
        Ok(resolve_token_refs(token, client, user))
    }

    async fn get_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<Option<ResolvedToken>, StoreError> {
        let tables = self.tables.read().expect("credential store lock poisoned");
        let Some(token) = tables
            .tokens
            .values()
            .find(|token| token.refresh_token.as_deref() == Some(refresh_token))
            .cloned()
        else {
            return Ok(None);
        };
        let client = tables.clients.get(&token.client_id).cloned();
        let user = tables.users.get(&token.user_id).cloned();
        Ok(resolve_token_refs(token, client, user))
    }

    async fn save_token(&self, token: &Token) -> Result<(), StoreError> {
        let mut tables = self.tables.write().expect("credential store lock poisoned");
        tables
            .tokens
            .insert(token.access_token.clone(), token.clone());
        Ok(())
    }

    async fn revoke_token(&self, refresh_token: &str) -> Result<Option<Token>, StoreError> {
        let mut tables = self.tables.write().expect("credential store lock poisoned");
        let access_key = tables
            .tokens
            .values()
            .find(|token| token.refresh_token.as_deref() == Some(refresh_token))
            .map(|token| token.access_token.clone());
        let Some(access_key) = access_key else {
            return Ok(None);
        };
        let mut token = tables
            .tokens
            .remove(&access_key)
            .expect("token disappeared under write lock");
        token.refresh_token_expires_at = Some(revoked_sentinel());
        Ok(Some(token))
    }

    async fn get_authorization_code(
        &self,
        code: &str,
    ) -> Result<Option<AuthorizationCode>, StoreError> {
        let tables = self.tables.read().expect("credential store lock poisoned");
        Ok(tables.codes.get(code).cloned())
    }

    async fn save_authorization_code(&self, code: &AuthorizationCode) -> Result<(), StoreError> {
        let mut tables = self.tables.write().expect("credential store lock poisoned");
        tables.codes.insert(code.code.clone(), code.clone());
        Ok(())
    }

    async fn take_authorization_code(
        &self,
        code: &str,
    ) -> Result<Option<AuthorizationCode>, StoreError> {
        let mut tables = self.tables.write().expect("credential store lock poisoned");
        Ok(tables.codes.remove(code))
    }

    async fn health_check(&self) -> Result<(), String> {
        Ok(())
    }
}
