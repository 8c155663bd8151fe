//! Protected resource routes, served behind the authentication guard.

use crate::errors::OAuthError;
use crate::guard::{self, Authenticated};
use crate::openapi::RESOURCE_TAG;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use log::debug;
use serde::Deserialize;
use serde_json::json;

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/user", get(user_profile))
        .route("/course", get(course))
}

async fn index() -> Html<&'static str> {
    Html("<html><body><h2>OAuth server</h2><p>You are signed in.</p></body></html>")
}

#[derive(Debug, Deserialize)]
struct UserQuery {
    token: Option<String>,
}

/// Profile lookup keyed by access token. An invalid token is
/// indistinguishable from a missing profile: both are 404.
#[utoipa::path(
    get,
    path = "/user",
    params(("token" = Option<String>, Query, description = "Access token")),
    responses(
        (status = 200, description = "Profile of the token's owner"),
        (status = 404, description = "Token invalid or expired")
    ),
    tag = RESOURCE_TAG
)]
async fn user_profile(State(state): State<AppState>, Query(query): Query<UserQuery>) -> Response {
    match guard::authenticate(&state, query.token.as_deref()).await {
        Ok(auth) => Json(json!({ "username": auth.user.username })).into_response(),
        Err(err) => {
            debug!("Profile lookup rejected: {err}");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

/// Sample scoped resource: requires the `course` scope when the deployment
/// enforces scopes.
#[utoipa::path(
    get,
    path = "/course",
    responses(
        (status = 200, description = "Course content"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "Token lacks the course scope")
    ),
    tag = RESOURCE_TAG
)]
async fn course(State(state): State<AppState>, auth: Authenticated) -> Response {
    if !guard::check_scope("course", &auth.token, &state.config) {
        return OAuthError::InsufficientScope("Required scope: `course`".into()).into_response();
    }
    Json(json!({ "message": "Get user course success!" })).into_response()
}
