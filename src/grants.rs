//! Grant engine: the four OAuth2 grant flows and the authorize step.

use crate::api::oauth::models::TokenRequest;
use crate::config::ServerConfig;
use crate::errors::OAuthError;
use crate::models::{AuthorizationCode, Client, GrantType, Token, User};
use crate::store::{CredentialStore, Store};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{Duration, Utc};
use log::{debug, info, warn};
use rand::Rng;
use std::sync::Arc;

/// Client authentication material extracted from Basic auth or the request
/// body. The secret stays optional: the authorization_code and refresh_token
/// flows authenticate by id alone when no secret is re-presented.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub id: String,
    pub secret: Option<String>,
}

/// Input to the authorize step, replayed from the stashed session query with
/// the authenticated user bound in.
#[derive(Debug, Clone)]
pub struct AuthorizeRequest {
    pub client_id: String,
    pub redirect_uri: String,
    pub response_type: Option<String>,
    pub scope: Option<String>,
    pub user_id: String,
}

/// A freshly issued token pair plus the access lifetime used, for the
/// `expires_in` response field.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: Token,
    pub expires_in: u64,
}

/// State machine over the four grant types. All flows share one entry point
/// (`token`) and compose credential-store calls; the store's atomic
/// take/revoke operations carry the single-use guarantees.
#[derive(Clone)]
pub struct GrantEngine {
    store: Arc<Store>,
    config: Arc<ServerConfig>,
}

impl GrantEngine {
    pub fn new(store: Arc<Store>, config: Arc<ServerConfig>) -> Self {
        Self { store, config }
    }

    /// Token endpoint entry point: dispatch on the requested grant type.
    pub async fn token(
        &self,
        credentials: ClientCredentials,
        request: &TokenRequest,
    ) -> Result<IssuedToken, OAuthError> {
        let grant_param = request
            .grant_type
            .as_deref()
            .ok_or_else(|| OAuthError::InvalidArgument("Missing parameter: `grant_type`".into()))?;
        let grant = GrantType::from_param(grant_param)
            .ok_or_else(|| OAuthError::UnsupportedGrantType(grant_param.to_string()))?;

        debug!(
            "Token request from client `{}` with grant_type `{}`",
            credentials.id, grant
        );

        match grant {
            GrantType::AuthorizationCode => {
                self.authorization_code_grant(&credentials, request).await
            }
            GrantType::ClientCredentials => {
                self.client_credentials_grant(&credentials, request).await
            }
            GrantType::Password => self.password_grant(&credentials, request).await,
            GrantType::RefreshToken => self.refresh_token_grant(&credentials, request).await,
        }
    }

    async fn authorization_code_grant(
        &self,
        credentials: &ClientCredentials,
        request: &TokenRequest,
    ) -> Result<IssuedToken, OAuthError> {
        let code_value = request
            .code
            .as_deref()
            .ok_or_else(|| OAuthError::InvalidArgument("Missing parameter: `code`".into()))?;
        let redirect_uri = request.redirect_uri.as_deref().ok_or_else(|| {
            OAuthError::InvalidArgument("Missing parameter: `redirect_uri`".into())
        })?;

        let client = self
            .authenticated_client(credentials, GrantType::AuthorizationCode, false)
            .await?;

        // Single atomic fetch-and-remove: of any concurrent redemptions of
        // the same code, exactly one proceeds past this point.
        let code = self
            .store
            .take_authorization_code(code_value)
            .await?
            .ok_or_else(|| {
                OAuthError::InvalidGrant(
                    "authorization code is invalid or has already been used".into(),
                )
            })?;

        // The code is already consumed; a failed check below burns it.
        if code.client_id != client.id {
            warn!(
                "Authorization code presented by client `{}` was issued to `{}`",
                client.id, code.client_id
            );
            return Err(OAuthError::InvalidGrant(
                "authorization code was issued to a different client".into(),
            ));
        }
        if code.expires_at <= Utc::now() {
            return Err(OAuthError::InvalidGrant(
                "authorization code has expired".into(),
            ));
        }
        if code.redirect_uri != redirect_uri {
            warn!("redirect_uri mismatch while redeeming code for `{}`", client.id);
            return Err(OAuthError::InvalidGrant(
                "redirect_uri does not match the authorization request".into(),
            ));
        }

        let user = self
            .store
            .get_user_by_id(&code.user_id)
            .await?
            .ok_or_else(|| OAuthError::InvalidGrant("resource owner no longer exists".into()))?;

        self.issue(&client, &user, code.scope, true).await
    }

    async fn client_credentials_grant(
        &self,
        credentials: &ClientCredentials,
        request: &TokenRequest,
    ) -> Result<IssuedToken, OAuthError> {
        let client = self
            .authenticated_client(credentials, GrantType::ClientCredentials, true)
            .await?;

        // The client acts as its own resource owner through a non-persisted
        // representative user record.
        let user = User::from_client(&client);
        let scope = self.validate_scope(&client, request.scope.as_deref())?;

        // No refresh token for machine clients; they can always re-authenticate.
        self.issue(&client, &user, scope, false).await
    }

    async fn password_grant(
        &self,
        credentials: &ClientCredentials,
        request: &TokenRequest,
    ) -> Result<IssuedToken, OAuthError> {
        let username = request
            .username
            .as_deref()
            .ok_or_else(|| OAuthError::InvalidArgument("Missing parameter: `username`".into()))?;
        let password = request
            .password
            .as_deref()
            .ok_or_else(|| OAuthError::InvalidArgument("Missing parameter: `password`".into()))?;

        let client = self
            .authenticated_client(credentials, GrantType::Password, true)
            .await?;

        let user = self
            .store
            .get_user(username, password)
            .await?
            .ok_or_else(|| {
                OAuthError::InvalidGrant("resource owner credentials are invalid".into())
            })?;

        let scope = self.validate_scope(&client, request.scope.as_deref())?;
        self.issue(&client, &user, scope, true).await
    }

    async fn refresh_token_grant(
        &self,
        credentials: &ClientCredentials,
        request: &TokenRequest,
    ) -> Result<IssuedToken, OAuthError> {
        let refresh_value = request.refresh_token.as_deref().ok_or_else(|| {
            OAuthError::InvalidArgument("Missing parameter: `refresh_token`".into())
        })?;

        let client = self
            .authenticated_client(credentials, GrantType::RefreshToken, false)
            .await?;

        let resolved = self
            .store
            .get_refresh_token(refresh_value)
            .await?
            .ok_or_else(|| OAuthError::InvalidGrant("refresh token is invalid".into()))?;

        if resolved.token.client_id != client.id {
            warn!(
                "Refresh token presented by client `{}` was issued to `{}`",
                client.id, resolved.token.client_id
            );
            return Err(OAuthError::InvalidGrant(
                "refresh token was issued to a different client".into(),
            ));
        }
        match resolved.token.refresh_token_expires_at {
            Some(expires_at) if expires_at > Utc::now() => {}
            _ => {
                return Err(OAuthError::InvalidGrant("refresh token has expired".into()));
            }
        }

        // Rotate: revoke the old pair before issuing the new one. Losing a
        // concurrent race shows up as the token already being gone.
        if self.store.revoke_token(refresh_value).await?.is_none() {
            return Err(OAuthError::InvalidGrant(
                "refresh token has already been rotated".into(),
            ));
        }

        self.issue(
            &resolved.client,
            &resolved.user,
            resolved.token.scope.clone(),
            true,
        )
        .await
    }

    /// Authorize step: validate the client, register a first-seen redirect
    /// URI, check the requested scope and mint a short-lived code bound to
    /// the consenting user.
    pub async fn authorize(
        &self,
        request: AuthorizeRequest,
    ) -> Result<AuthorizationCode, OAuthError> {
        match request.response_type.as_deref() {
            Some("code") => {}
            Some(other) => {
                return Err(OAuthError::UnsupportedResponseType(other.to_string()));
            }
            None => {
                return Err(OAuthError::InvalidArgument(
                    "Missing parameter: `response_type`".into(),
                ));
            }
        }

        let client = self
            .prepare_authorize(&request.client_id, &request.redirect_uri)
            .await?;
        let user = self
            .store
            .get_user_by_id(&request.user_id)
            .await?
            .ok_or_else(|| {
                OAuthError::AccessDenied("authenticated user no longer exists".into())
            })?;
        let scope = self.validate_scope(&client, request.scope.as_deref())?;

        let code = AuthorizationCode {
            code: opaque_token(),
            expires_at: Utc::now() + Duration::seconds(self.config.tokens.code_ttl as i64),
            client_id: client.id,
            user_id: user.id.clone(),
            scope,
            redirect_uri: request.redirect_uri,
        };
        self.store.save_authorization_code(&code).await?;

        info!(
            "Issued authorization code for user `{}` via client `{}`",
            user.id, request.client_id
        );
        Ok(code)
    }

    /// Validate the client for the authorize flow and register the redirect
    /// URI on first use.
    pub async fn prepare_authorize(
        &self,
        client_id: &str,
        redirect_uri: &str,
    ) -> Result<Client, OAuthError> {
        let mut client = self
            .store
            .get_client(client_id, None)
            .await?
            .ok_or_else(|| OAuthError::InvalidClient("unknown client".into()))?;

        if !client.grants.contains(&GrantType::AuthorizationCode) {
            return Err(OAuthError::UnauthorizedClient(format!(
                "client `{client_id}` is not permitted to use the `authorization_code` grant"
            )));
        }

        if !client.redirect_uris.iter().any(|uri| uri == redirect_uri) {
            // First use of this callback: trust and register it.
            client.redirect_uris.push(redirect_uri.to_string());
            self.store.update_client(&client).await?;
            info!("Registered redirect URI `{redirect_uri}` for client `{client_id}`");
        }

        Ok(client)
    }

    async fn authenticated_client(
        &self,
        credentials: &ClientCredentials,
        grant: GrantType,
        require_secret: bool,
    ) -> Result<Client, OAuthError> {
        if require_secret && credentials.secret.is_none() {
            return Err(OAuthError::InvalidArgument(
                "Missing parameter: `client_secret`".into(),
            ));
        }

        let client = self
            .store
            .get_client(&credentials.id, credentials.secret.as_deref())
            .await?
            .ok_or_else(|| OAuthError::InvalidClient("client authentication failed".into()))?;

        if !client.grants.contains(&grant) {
            return Err(OAuthError::UnauthorizedClient(format!(
                "client `{}` is not permitted to use the `{grant}` grant",
                client.id
            )));
        }

        Ok(client)
    }

    /// A non-empty scope request must be a subset of the client's allowed
    /// scopes. An empty request grants no scope.
    fn validate_scope(
        &self,
        client: &Client,
        requested: Option<&str>,
    ) -> Result<Option<String>, OAuthError> {
        let requested = requested.map(str::trim).filter(|s| !s.is_empty());
        let Some(requested) = requested else {
            return Ok(None);
        };

        let mut granted = Vec::new();
        for part in requested.split_whitespace() {
            if !client.valid_scopes.iter().any(|scope| scope == part) {
                return Err(OAuthError::InvalidScope(format!(
                    "scope `{part}` is not permitted for this client"
                )));
            }
            granted.push(part);
        }
        Ok(Some(granted.join(" ")))
    }

    async fn issue(
        &self,
        client: &Client,
        user: &User,
        scope: Option<String>,
        with_refresh: bool,
    ) -> Result<IssuedToken, OAuthError> {
        let access_ttl = client
            .access_token_lifetime
            .unwrap_or(self.config.tokens.access_token_ttl);
        let refresh_ttl = client
            .refresh_token_lifetime
            .unwrap_or(self.config.tokens.refresh_token_ttl);
        let now = Utc::now();

        let token = Token {
            access_token: opaque_token(),
            refresh_token: with_refresh.then(opaque_token),
            access_token_expires_at: now + Duration::seconds(access_ttl as i64),
            refresh_token_expires_at: with_refresh
                .then(|| now + Duration::seconds(refresh_ttl as i64)),
            client_id: client.id.clone(),
            user_id: user.id.clone(),
            scope,
        };
        self.store.save_token(&token).await?;

        debug!(
            "Issued token for user `{}` via client `{}`, expires in {access_ttl}s",
            user.id, client.id
        );
        Ok(IssuedToken {
            token,
            expires_in: access_ttl,
        })
    }
}

/// Opaque credential string: 32 random bytes, base64url without padding.
pub(crate) fn opaque_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: Vec<u8> = (0..32).map(|_| rng.gen::<u8>()).collect();
    URL_SAFE_NO_PAD.encode(&bytes)
}
