//! Protocol error taxonomy, mapped onto RFC 6749 error codes.

use crate::store::StoreError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use log::error;
use serde::Serialize;
use thiserror::Error;
use url::Url;
use utoipa::ToSchema;

/// Errors surfaced by the grant engine, the guard and the authorize flow.
///
/// Store-layer not-found results are translated into `InvalidGrant` /
/// `InvalidClient` at the call site; only genuine backend failures travel
/// through the `Store` variant and render as `server_error`.
#[derive(Debug, Error)]
pub enum OAuthError {
    /// A required request parameter is missing or malformed
    #[error("{0}")]
    InvalidArgument(String),
    /// Unknown client, or the presented secret does not match
    #[error("{0}")]
    InvalidClient(String),
    /// Unknown, expired or already-consumed code/token, or a binding mismatch
    #[error("{0}")]
    InvalidGrant(String),
    /// Requested scope exceeds what the client is allowed
    #[error("{0}")]
    InvalidScope(String),
    /// The bearer token lacks a scope the resource requires
    #[error("{0}")]
    InsufficientScope(String),
    /// The client is not permitted to use the requested grant type
    #[error("{0}")]
    UnauthorizedClient(String),
    #[error("unsupported grant type `{0}`")]
    UnsupportedGrantType(String),
    #[error("unsupported response type `{0}`")]
    UnsupportedResponseType(String),
    /// Missing or unresolvable bearer token on a protected request
    #[error("{0}")]
    UnauthorizedRequest(String),
    /// Authenticated, but the consent/ownership check failed
    #[error("{0}")]
    AccessDenied(String),
    /// Unexpected internal fault; fatal to the request only
    #[error("{0}")]
    Internal(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// RFC 6749 wire shape for protocol errors.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl OAuthError {
    /// RFC 6749 error code this variant serializes as.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_request",
            Self::InvalidClient(_) => "invalid_client",
            Self::InvalidGrant(_) => "invalid_grant",
            Self::InvalidScope(_) | Self::InsufficientScope(_) => "invalid_scope",
            Self::UnauthorizedClient(_) => "unauthorized_client",
            Self::UnsupportedGrantType(_) => "unsupported_grant_type",
            Self::UnsupportedResponseType(_) => "unsupported_response_type",
            Self::UnauthorizedRequest(_) => "unauthorized_request",
            Self::AccessDenied(_) => "access_denied",
            Self::Internal(_) | Self::Store(_) => "server_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidArgument(_)
            | Self::InvalidGrant(_)
            | Self::InvalidScope(_)
            | Self::UnauthorizedClient(_)
            | Self::UnsupportedGrantType(_)
            | Self::UnsupportedResponseType(_) => StatusCode::BAD_REQUEST,
            Self::InvalidClient(_) | Self::UnauthorizedRequest(_) => StatusCode::UNAUTHORIZED,
            // Scope and consent denials on protected resources
            Self::InsufficientScope(_) | Self::AccessDenied(_) => StatusCode::FORBIDDEN,
            Self::Internal(_) | Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn into_body(self) -> ErrorBody {
        let description = match &self {
            // Backend details stay in the logs.
            Self::Internal(_) | Self::Store(_) => "internal server error".to_string(),
            other => other.to_string(),
        };
        ErrorBody {
            error: self.error_code().to_string(),
            error_description: Some(description),
        }
    }
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        match &self {
            Self::Internal(detail) => error!("Request failed on internal error: {detail}"),
            Self::Store(err) => error!("Request failed on store error: {err}"),
            _ => {}
        }
        let status = self.status();
        (status, Json(self.into_body())).into_response()
    }
}

/// Redirect back to the client with `error`/`error_description` (and `state`
/// when present) in the query, falling back to a JSON body when the redirect
/// URI is unusable.
pub fn redirect_with_error(
    redirect_uri: &str,
    error: OAuthError,
    state: Option<&str>,
) -> Response {
    match Url::parse(redirect_uri) {
        Ok(mut url) => {
            let body = error.into_body();
            url.query_pairs_mut()
                .append_pair("error", &body.error)
                .append_pair(
                    "error_description",
                    body.error_description.as_deref().unwrap_or(""),
                );
            if let Some(state) = state {
                url.query_pairs_mut().append_pair("state", state);
            }
            Redirect::to(url.as_str()).into_response()
        }
        Err(_) => error.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_and_statuses() {
        let cases: [(OAuthError, &str, StatusCode); 6] = [
            (
                OAuthError::InvalidArgument("missing code".into()),
                "invalid_request",
                StatusCode::BAD_REQUEST,
            ),
            (
                OAuthError::InvalidClient("unknown client".into()),
                "invalid_client",
                StatusCode::UNAUTHORIZED,
            ),
            (
                OAuthError::InvalidGrant("code consumed".into()),
                "invalid_grant",
                StatusCode::BAD_REQUEST,
            ),
            (
                OAuthError::InvalidScope("scope exceeds grant".into()),
                "invalid_scope",
                StatusCode::BAD_REQUEST,
            ),
            (
                OAuthError::InsufficientScope("course required".into()),
                "invalid_scope",
                StatusCode::FORBIDDEN,
            ),
            (
                OAuthError::UnauthorizedRequest("missing bearer".into()),
                "unauthorized_request",
                StatusCode::UNAUTHORIZED,
            ),
        ];
        for (error, code, status) in cases {
            assert_eq!(error.error_code(), code);
            assert_eq!(error.status(), status);
        }
    }

    #[test]
    fn internal_errors_do_not_leak_details() {
        let body = OAuthError::Internal("connection pool exhausted".into()).into_body();
        assert_eq!(body.error, "server_error");
        assert_eq!(body.error_description.as_deref(), Some("internal server error"));
    }

    #[test]
    fn redirect_with_error_appends_query() {
        let response = redirect_with_error(
            "https://cb.example/done",
            OAuthError::AccessDenied("user denied authorization".into()),
            Some("xyz"),
        );
        let location = response
            .headers()
            .get(axum::http::header::LOCATION)
            .expect("redirect has location")
            .to_str()
            .unwrap()
            .to_string();
        assert!(location.starts_with("https://cb.example/done?"));
        assert!(location.contains("error=access_denied"));
        assert!(location.contains("state=xyz"));
    }

    #[test]
    fn redirect_with_error_falls_back_to_json() {
        let response = redirect_with_error(
            "not a url",
            OAuthError::InvalidArgument("bad redirect".into()),
            None,
        );
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
