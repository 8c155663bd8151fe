//! Bearer-token authentication for protected resources.

use crate::config::ServerConfig;
use crate::errors::OAuthError;
use crate::models::{Client, Token, User};
use crate::state::AppState;
use crate::store::CredentialStore;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use log::debug;

/// The identity behind a validated bearer token: the token itself plus its
/// rehydrated user and client.
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub token: Token,
    pub user: User,
    pub client: Client,
}

/// Resolve a bearer token through the store. Rejects absent or expired
/// tokens and tokens whose weak references no longer resolve.
pub async fn authenticate(
    state: &AppState,
    bearer: Option<&str>,
) -> Result<Authenticated, OAuthError> {
    let bearer = bearer
        .filter(|token| !token.is_empty())
        .ok_or_else(|| OAuthError::UnauthorizedRequest("missing bearer token".into()))?;

    let resolved = state
        .store
        .get_access_token(bearer)
        .await?
        .ok_or_else(|| OAuthError::UnauthorizedRequest("invalid access token".into()))?;

    if resolved.token.access_token_expires_at <= Utc::now() {
        return Err(OAuthError::UnauthorizedRequest(
            "access token has expired".into(),
        ));
    }

    debug!(
        "Authenticated bearer token for user `{}` via client `{}`",
        resolved.user.id, resolved.client.id
    );
    Ok(Authenticated {
        token: resolved.token,
        user: resolved.user,
        client: resolved.client,
    })
}

/// Scope-check predicate for downstream resource handlers.
///
/// When the deployment runs without a scope model (`scope_enforced` off),
/// every valid bearer token is authorized; this is a deliberate mode for
/// resource servers with no per-route scoping.
pub fn check_scope(required: &str, token: &Token, config: &ServerConfig) -> bool {
    if !config.tokens.scope_enforced {
        return true;
    }
    token
        .scope
        .as_deref()
        .map(|scope| scope.split_whitespace().any(|part| part == required))
        .unwrap_or(false)
}

/// Pull the bearer token from the Authorization header, or from the
/// `access_token` query parameter when the deployment allows it.
fn bearer_from_parts(parts: &Parts, config: &ServerConfig) -> Option<String> {
    let header_token = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string);
    if header_token.is_some() {
        return header_token;
    }

    if config.tokens.allow_bearer_in_query {
        if let Some(query) = parts.uri.query() {
            return url::form_urlencoded::parse(query.as_bytes())
                .find(|(key, _)| key == "access_token")
                .map(|(_, value)| value.into_owned());
        }
    }
    None
}

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let bearer = bearer_from_parts(parts, &state.config);
        authenticate(state, bearer.as_deref())
            .await
            .map_err(IntoResponse::into_response)
    }
}
