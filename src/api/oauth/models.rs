//! OAuth 2.0 endpoint request/response structures

use crate::grants::IssuedToken;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Authorization endpoint query parameters (RFC 6749 Section 4.1.1). All
/// fields are optional at the wire level; validation happens against the
/// stashed request once the caller is authenticated.
#[derive(Debug, Deserialize, ToSchema)]
pub struct AuthorizeQuery {
    /// Must be "code"
    pub response_type: Option<String>,
    /// Client identifier
    pub client_id: Option<String>,
    /// Redirect URI the authorization code will be sent to
    pub redirect_uri: Option<String>,
    /// Requested scopes (space-separated)
    pub scope: Option<String>,
    /// State parameter for CSRF protection
    pub state: Option<String>,
}

/// Consent form submitted from the authorization page.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ConsentForm {
    /// "authorize" or "deny"
    pub action: Option<String>,
}

/// Token endpoint request (RFC 6749 Section 4.1.3/4.3.2/4.4.2/6).
/// Client credentials may arrive here or through Basic auth.
#[derive(Debug, Deserialize, ToSchema)]
pub struct TokenRequest {
    /// One of "authorization_code", "client_credentials", "password",
    /// "refresh_token"
    pub grant_type: Option<String>,
    /// Client identifier (when not using Basic auth)
    pub client_id: Option<String>,
    /// Client secret (when not using Basic auth)
    pub client_secret: Option<String>,
    /// Authorization code (authorization_code grant)
    pub code: Option<String>,
    /// Redirect URI, must match the authorization request
    /// (authorization_code grant)
    pub redirect_uri: Option<String>,
    /// Resource owner username (password grant)
    pub username: Option<String>,
    /// Resource owner password (password grant)
    pub password: Option<String>,
    /// Refresh token (refresh_token grant)
    pub refresh_token: Option<String>,
    /// Requested scopes (space-separated)
    pub scope: Option<String>,
}

/// Token endpoint success response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    /// The access token string
    pub access_token: String,
    /// Token type - always "Bearer"
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
    /// Refresh token, absent for grants that do not issue one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Granted scopes (space-separated)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl From<IssuedToken> for TokenResponse {
    fn from(issued: IssuedToken) -> Self {
        Self {
            access_token: issued.token.access_token,
            token_type: "Bearer".to_string(),
            expires_in: issued.expires_in,
            refresh_token: issued.token.refresh_token,
            scope: issued.token.scope,
        }
    }
}
