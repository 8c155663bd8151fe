//! Authorization and token endpoint handlers

use crate::api::oauth::models::{AuthorizeQuery, ConsentForm, TokenRequest, TokenResponse};
use crate::errors::{redirect_with_error, OAuthError};
use crate::grants::{AuthorizeRequest, ClientCredentials, GrantEngine};
use crate::models::Client;
use crate::openapi::OAUTH_TAG;
use crate::session::{self, PendingAuthorization, SessionClaims};
use crate::state::AppState;
use axum::extract::{Form, Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Json;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use log::{info, warn};
use tower_cookies::Cookies;
use url::Url;

/// Authorization endpoint (RFC 6749 Section 4.1.1).
///
/// An unauthenticated caller has the request stashed into the signed session
/// and is bounced to `/login`; an authenticated caller gets the consent page
/// after client validation and first-use redirect-URI registration.
#[utoipa::path(
    get,
    path = "/authorize",
    params(
        ("response_type" = Option<String>, Query, description = "Must be 'code'"),
        ("client_id" = Option<String>, Query, description = "Client identifier"),
        ("redirect_uri" = Option<String>, Query, description = "Redirect URI"),
        ("scope" = Option<String>, Query, description = "Requested scopes"),
        ("state" = Option<String>, Query, description = "State parameter for CSRF protection")
    ),
    responses(
        (status = 200, description = "Consent page"),
        (status = 303, description = "Redirect to /login"),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Unknown client")
    ),
    tag = OAUTH_TAG
)]
pub async fn authorize(
    State(state): State<AppState>,
    cookies: Cookies,
    Query(query): Query<AuthorizeQuery>,
) -> Response {
    let config = &state.config;
    let mut session =
        session::load(&cookies, config).unwrap_or_else(|| SessionClaims::new(config.session.ttl));

    if session.user_id.is_none() {
        info!("User not authenticated, redirecting to /login");
        let pending = match pending_from_query(&query) {
            Ok(pending) => pending,
            Err(err) => return err.into_response(),
        };
        session.pending = Some(pending);
        if let Err(err) = session::save(&cookies, &session, config) {
            return session_save_failure(err);
        }
        return Redirect::to("/login").into_response();
    }

    // Prefer the request stashed before the login round trip; a caller that
    // was already logged in carries it in the live query instead.
    let pending = match session.pending.clone() {
        Some(pending) => pending,
        None => {
            let pending = match pending_from_query(&query) {
                Ok(pending) => pending,
                Err(err) => return err.into_response(),
            };
            session.pending = Some(pending.clone());
            if let Err(err) = session::save(&cookies, &session, config) {
                return session_save_failure(err);
            }
            pending
        }
    };

    let engine = GrantEngine::new(state.store.clone(), state.config.clone());
    let client = match engine
        .prepare_authorize(&pending.client_id, &pending.redirect_uri)
        .await
    {
        Ok(client) => client,
        Err(err) => {
            warn!("Authorize request rejected: {err}");
            return err.into_response();
        }
    };

    Html(render_consent_page(&client, &pending)).into_response()
}

/// Consent endpoint: resumes the stashed authorization, issues a code and
/// redirects back to the client.
#[utoipa::path(
    post,
    path = "/authorize",
    request_body = ConsentForm,
    responses(
        (status = 303, description = "Redirect to redirect_uri with code and state"),
        (status = 400, description = "No pending authorization request")
    ),
    tag = OAUTH_TAG
)]
pub async fn approve(
    State(state): State<AppState>,
    cookies: Cookies,
    Form(form): Form<ConsentForm>,
) -> Response {
    let config = &state.config;
    let Some(mut session) = session::load(&cookies, config) else {
        info!("User not authenticated, redirecting to /login");
        return Redirect::to("/login").into_response();
    };
    let Some(user_id) = session.user_id.clone() else {
        info!("User not authenticated, redirecting to /login");
        return Redirect::to("/login").into_response();
    };
    let Some(pending) = session.pending.take() else {
        return OAuthError::InvalidArgument("no pending authorization request".into())
            .into_response();
    };

    // The stashed request is consumed either way.
    if let Err(err) = session::save(&cookies, &session, config) {
        return session_save_failure(err);
    }

    if form.action.as_deref() == Some("deny") {
        info!("User {user_id} denied authorization for client {}", pending.client_id);
        return redirect_with_error(
            &pending.redirect_uri,
            OAuthError::AccessDenied("user denied authorization".into()),
            pending.state.as_deref(),
        );
    }

    let engine = GrantEngine::new(state.store.clone(), state.config.clone());
    let request = AuthorizeRequest {
        client_id: pending.client_id.clone(),
        redirect_uri: pending.redirect_uri.clone(),
        response_type: pending.response_type.clone(),
        scope: pending.scope.clone(),
        user_id,
    };

    match engine.authorize(request).await {
        Ok(code) => {
            let mut url = match Url::parse(&pending.redirect_uri) {
                Ok(url) => url,
                Err(_) => {
                    return OAuthError::InvalidArgument("invalid redirect_uri".into())
                        .into_response();
                }
            };
            url.query_pairs_mut().append_pair("code", &code.code);
            if let Some(state_param) = &pending.state {
                url.query_pairs_mut().append_pair("state", state_param);
            }
            Redirect::to(url.as_str()).into_response()
        }
        // An unknown client never gets a redirect back.
        Err(err @ OAuthError::InvalidClient(_)) => err.into_response(),
        Err(err) => {
            warn!("Authorize step failed: {err}");
            redirect_with_error(&pending.redirect_uri, err, pending.state.as_deref())
        }
    }
}

/// Token endpoint (RFC 6749). Dispatches the four grant types; client
/// credentials arrive through Basic auth or the request body.
#[utoipa::path(
    post,
    path = "/token",
    request_body = TokenRequest,
    responses(
        (status = 200, description = "Access token issued successfully", body = TokenResponse),
        (status = 400, description = "Invalid request or grant"),
        (status = 401, description = "Invalid client credentials")
    ),
    tag = OAUTH_TAG
)]
pub async fn token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(request): Form<TokenRequest>,
) -> Response {
    info!(
        "Token request with grant_type: {}",
        request.grant_type.as_deref().unwrap_or("<missing>")
    );

    let credentials = match client_credentials_from(&headers, &request) {
        Ok(credentials) => credentials,
        Err(err) => {
            warn!("Token request rejected: {err}");
            return err.into_response();
        }
    };

    let engine = GrantEngine::new(state.store.clone(), state.config.clone());
    match engine.token(credentials, &request).await {
        Ok(issued) => Json(TokenResponse::from(issued)).into_response(),
        Err(err) => {
            warn!("Token request failed: {err}");
            err.into_response()
        }
    }
}

/// Extract client credentials from the Basic authorization header, falling
/// back to the request body.
fn client_credentials_from(
    headers: &HeaderMap,
    request: &TokenRequest,
) -> Result<ClientCredentials, OAuthError> {
    if let Some(value) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        if let Some(encoded) = value.strip_prefix("Basic ") {
            let malformed =
                || OAuthError::InvalidClient("malformed Basic authorization header".into());
            let decoded = STANDARD.decode(encoded).map_err(|_| malformed())?;
            let decoded = String::from_utf8(decoded).map_err(|_| malformed())?;
            let (id, secret) = decoded.split_once(':').ok_or_else(malformed)?;
            return Ok(ClientCredentials {
                id: id.to_string(),
                secret: Some(secret.to_string()),
            });
        }
    }

    let id = request
        .client_id
        .clone()
        .ok_or_else(|| OAuthError::InvalidArgument("Missing parameter: `client_id`".into()))?;
    Ok(ClientCredentials {
        id,
        secret: request.client_secret.clone(),
    })
}

fn pending_from_query(query: &AuthorizeQuery) -> Result<PendingAuthorization, OAuthError> {
    let (Some(client_id), Some(redirect_uri)) =
        (query.client_id.clone(), query.redirect_uri.clone())
    else {
        return Err(OAuthError::InvalidArgument(
            "client_id and redirect_uri are required".into(),
        ));
    };
    Ok(PendingAuthorization {
        client_id,
        redirect_uri,
        response_type: query.response_type.clone(),
        scope: query.scope.clone(),
        state: query.state.clone(),
    })
}

fn session_save_failure(err: jsonwebtoken::errors::Error) -> Response {
    OAuthError::Internal(format!("failed to sign session token: {err}")).into_response()
}

fn render_consent_page(client: &Client, pending: &PendingAuthorization) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Authorization Required</title>
    <style>
        body {{ font-family: Arial, sans-serif; max-width: 400px; margin: 50px auto; padding: 20px; }}
        .scope-list {{ background: #f8f9fa; padding: 10px; border-radius: 4px; margin: 10px 0; }}
        button {{ background: #007bff; color: white; padding: 10px 20px; border: none; border-radius: 4px; cursor: pointer; }}
    </style>
</head>
<body>
    <h2>Authorization Required</h2>
    <p>Application <strong>{}</strong> is requesting access to your account.</p>

    <div class="scope-list">
        <strong>Requested permissions:</strong><br>
        {}
    </div>

    <form method="post" action="/authorize">
        <button type="submit" name="action" value="authorize">Authorize</button>
        <button type="submit" name="action" value="deny">Deny</button>
    </form>
</body>
</html>
"#,
        client.name,
        pending
            .scope
            .as_deref()
            .filter(|scope| !scope.is_empty())
            .unwrap_or("No specific scopes requested"),
    )
}
