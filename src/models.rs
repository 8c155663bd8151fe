//! Persisted entity types shared by the store, grant engine and guard.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The four recognized protocol paths for exchanging credentials for a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    AuthorizationCode,
    ClientCredentials,
    Password,
    RefreshToken,
}

impl GrantType {
    /// Parse a `grant_type` request parameter.
    pub fn from_param(value: &str) -> Option<Self> {
        match value {
            "authorization_code" => Some(Self::AuthorizationCode),
            "client_credentials" => Some(Self::ClientCredentials),
            "password" => Some(Self::Password),
            "refresh_token" => Some(Self::RefreshToken),
            _ => None,
        }
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AuthorizationCode => "authorization_code",
            Self::ClientCredentials => "client_credentials",
            Self::Password => "password",
            Self::RefreshToken => "refresh_token",
        };
        f.write_str(name)
    }
}

/// A registered OAuth client application.
///
/// `secret` is absent for public clients. Token lifetimes are optional; the
/// server-wide defaults apply when unset. `redirect_uris` grows through
/// first-use registration during the authorize flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub id: String,
    pub secret: Option<String>,
    pub name: String,
    pub access_token_lifetime: Option<u64>,
    pub refresh_token_lifetime: Option<u64>,
    pub redirect_uris: Vec<String>,
    pub grants: Vec<GrantType>,
    pub valid_scopes: Vec<String>,
}

/// A resource owner.
///
/// `credential` holds either a password or the current one-time login code,
/// depending on the deployment's login mode; `timestamp` records the last
/// credential update and bounds one-time-code validity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub credential: String,
    pub timestamp: DateTime<Utc>,
    /// Set on the non-persisted pseudo-user representing a client in the
    /// client_credentials grant.
    #[serde(default)]
    pub is_client: bool,
}

impl User {
    /// The representative user record for a client authenticating on its own
    /// behalf (client_credentials). Never persisted; the weak user reference
    /// on tokens issued this way points back at the client id.
    pub fn from_client(client: &Client) -> Self {
        Self {
            id: client.id.clone(),
            username: client.name.clone(),
            credential: String::new(),
            timestamp: Utc::now(),
            is_client: true,
        }
    }
}

/// A single-use, short-lived proof of resource-owner consent.
///
/// `client_id` and `user_id` are weak references; they are rehydrated through
/// the store on every read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationCode {
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub client_id: String,
    pub user_id: String,
    pub scope: Option<String>,
    pub redirect_uri: String,
}

/// An access/refresh token pair, created atomically on every successful grant.
///
/// The refresh half is absent for grants that do not issue one
/// (client_credentials). `client_id` and `user_id` are weak references.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token_expires_at: Option<DateTime<Utc>>,
    pub client_id: String,
    pub user_id: String,
    pub scope: Option<String>,
}

/// A token with its weak references resolved into full entities.
#[derive(Debug, Clone)]
pub struct ResolvedToken {
    pub token: Token,
    pub user: User,
    pub client: Client,
}

/// Obviously-past expiry stamped onto revoked records returned to callers.
pub fn revoked_sentinel() -> DateTime<Utc> {
    // 1984-01-01T00:00:00Z
    DateTime::from_timestamp(441_763_200, 0).unwrap_or(DateTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_type_round_trip() {
        for name in [
            "authorization_code",
            "client_credentials",
            "password",
            "refresh_token",
        ] {
            let grant = GrantType::from_param(name).expect("known grant type");
            assert_eq!(grant.to_string(), name);
        }
        assert!(GrantType::from_param("implicit").is_none());
    }

    #[test]
    fn grant_type_serializes_to_wire_name() {
        let client = Client {
            id: "c1".to_string(),
            secret: None,
            name: "test".to_string(),
            access_token_lifetime: None,
            refresh_token_lifetime: None,
            redirect_uris: vec![],
            grants: vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
            valid_scopes: vec![],
        };
        let json = serde_json::to_value(&client).expect("serialize client");
        assert_eq!(
            json["grants"],
            serde_json::json!(["authorization_code", "refresh_token"])
        );
    }

    #[test]
    fn pseudo_user_borrows_client_identity() {
        let client = Client {
            id: "device-42".to_string(),
            secret: Some("s".to_string()),
            name: "some device".to_string(),
            access_token_lifetime: None,
            refresh_token_lifetime: None,
            redirect_uris: vec![],
            grants: vec![GrantType::ClientCredentials],
            valid_scopes: vec![],
        };
        let user = User::from_client(&client);
        assert!(user.is_client);
        assert_eq!(user.id, client.id);
        assert_eq!(user.username, client.name);
    }

    #[test]
    fn sentinel_is_in_the_past() {
        assert!(revoked_sentinel() < Utc::now());
    }
}
