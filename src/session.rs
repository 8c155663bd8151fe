//! Stateless per-caller session carried in a signed cookie.
//!
//! The session exists to bridge the login redirect round trip of the
//! authorize flow: it holds the authenticated user id and the stashed
//! authorize-request parameters. Signing makes the state caller-affine, so
//! any replica can resume an in-flight login.

use crate::config::ServerConfig;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::debug;
use serde::{Deserialize, Serialize};
use tower_cookies::{Cookie, Cookies};

pub const SESSION_COOKIE: &str = "oauth_session";

/// Authorize-request parameters stashed while the caller logs in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingAuthorization {
    pub client_id: String,
    pub redirect_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// Claims of the signed session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub exp: usize,
    /// Set once the caller has authenticated at `/login`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Present only for the duration of the login redirect round trip.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending: Option<PendingAuthorization>,
}

impl SessionClaims {
    pub fn new(ttl_secs: u64) -> Self {
        let exp = (chrono::Utc::now().timestamp() as usize).saturating_add(ttl_secs as usize);
        Self {
            exp,
            user_id: None,
            pending: None,
        }
    }
}

/// Decode the session cookie. Any tampered, expired or absent token yields
/// `None` — an anonymous session.
pub fn load(cookies: &Cookies, config: &ServerConfig) -> Option<SessionClaims> {
    let cookie = cookies.get(SESSION_COOKIE)?;
    let key = DecodingKey::from_secret(config.session.secret.as_bytes());
    match decode::<SessionClaims>(cookie.value(), &key, &Validation::default()) {
        Ok(data) => Some(data.claims),
        Err(err) => {
            debug!("Discarding invalid session token: {err}");
            None
        }
    }
}

/// Sign the claims and set the session cookie.
pub fn save(
    cookies: &Cookies,
    claims: &SessionClaims,
    config: &ServerConfig,
) -> Result<(), jsonwebtoken::errors::Error> {
    let key = EncodingKey::from_secret(config.session.secret.as_bytes());
    let token = encode(&Header::default(), claims, &key)?;
    let mut cookie = Cookie::new(SESSION_COOKIE, token);
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookies.add(cookie);
    Ok(())
}

/// Drop the session cookie.
pub fn clear(cookies: &Cookies) {
    let mut cookie = Cookie::new(SESSION_COOKIE, "");
    cookie.set_path("/");
    cookies.remove(cookie);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(claims: &SessionClaims, secret: &str) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn verify(token: &str, secret: &str) -> Option<SessionClaims> {
        decode::<SessionClaims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )
        .ok()
        .map(|data| data.claims)
    }

    #[test]
    fn test_round_trip() {
        let mut claims = SessionClaims::new(3600);
        claims.user_id = Some("1".to_string());
        claims.pending = Some(PendingAuthorization {
            client_id: "xiaomi".to_string(),
            redirect_uri: "https://cb".to_string(),
            response_type: Some("code".to_string()),
            scope: None,
            state: Some("xyz".to_string()),
        });

        let token = sign(&claims, "secret");
        let decoded = verify(&token, "secret").expect("valid token decodes");
        assert_eq!(decoded.user_id.as_deref(), Some("1"));
        assert_eq!(decoded.pending, claims.pending);
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let claims = SessionClaims::new(3600);
        let token = sign(&claims, "secret");
        assert!(verify(&token, "other-secret").is_none());
    }

    #[test]
    fn test_tampered_token_is_rejected() {
        let claims = SessionClaims::new(3600);
        let mut token = sign(&claims, "secret");
        token.push('x');
        assert!(verify(&token, "secret").is_none());
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let claims = SessionClaims {
            exp: 1_000, // long past, outside any leeway
            user_id: Some("1".to_string()),
            pending: None,
        };
        let token = sign(&claims, "secret");
        assert!(verify(&token, "secret").is_none());
    }
}
