//! Login, logout and one-time-code endpoints

use crate::config::login::LoginMode;
use crate::directory::UserDirectory;
use crate::errors::OAuthError;
use crate::openapi::LOGIN_TAG;
use crate::session::{self, SessionClaims};
use crate::state::AppState;
use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_cookies::Cookies;
use utoipa::ToSchema;

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/login", get(login_page).post(login))
        .route("/logout", get(logout))
        .route("/request/code", post(request_code))
}

/// Login form body: username/password in password mode, phone/code in
/// one-time-code mode.
#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginForm {
    pub username: Option<String>,
    pub password: Option<String>,
    pub phone: Option<String>,
    pub code: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RequestCodeBody {
    pub phone: String,
}

/// `/request/code` always answers 200; `result` reports the delivery
/// dispatch outcome.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RequestCodeResponse {
    pub result: bool,
    pub response: String,
}

async fn login_page(State(state): State<AppState>) -> Html<&'static str> {
    match state.config.login.mode {
        LoginMode::Password => Html(
            r#"<!DOCTYPE html>
<html>
<head><title>Sign in</title></head>
<body>
    <h2>Sign in</h2>
    <form method="post" action="/login">
        <label for="username">Username:</label>
        <input type="text" id="username" name="username" required>
        <label for="password">Password:</label>
        <input type="password" id="password" name="password" required>
        <button type="submit">Sign in</button>
    </form>
</body>
</html>
"#,
        ),
        LoginMode::OneTimeCode => Html(
            r#"<!DOCTYPE html>
<html>
<head><title>Sign in</title></head>
<body>
    <h2>Sign in</h2>
    <form method="post" action="/login">
        <label for="phone">Phone:</label>
        <input type="text" id="phone" name="phone" required>
        <label for="code">Code:</label>
        <input type="text" id="code" name="code" required>
        <button type="submit">Sign in</button>
    </form>
</body>
</html>
"#,
        ),
    }
}

/// Authenticate the resource owner and set the session cookie. With a
/// pending authorization stashed in the session, success resumes the
/// authorize flow; otherwise the caller lands on the index page.
#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginForm,
    responses(
        (status = 303, description = "Login success, redirect to /authorize or /"),
        (status = 400, description = "Missing credentials"),
        (status = 401, description = "Invalid credentials")
    ),
    tag = LOGIN_TAG
)]
async fn login(
    State(state): State<AppState>,
    cookies: Cookies,
    Form(form): Form<LoginForm>,
) -> Response {
    let config = &state.config;
    let (identifier, credential) = match config.login.mode {
        LoginMode::Password => (form.username, form.password),
        LoginMode::OneTimeCode => (form.phone, form.code),
    };
    let (Some(identifier), Some(credential)) = (identifier, credential) else {
        return OAuthError::InvalidArgument("missing login credentials".into()).into_response();
    };

    let directory = UserDirectory::new(state.store.clone(), state.config.clone());
    match directory.authenticate(&identifier, &credential).await {
        Ok(Some(user)) => {
            info!("User {} login success", user.id);
            let mut session = session::load(&cookies, config)
                .unwrap_or_else(|| SessionClaims::new(config.session.ttl));
            session.user_id = Some(user.id);
            let resume_authorize = session.pending.is_some();
            if let Err(err) = session::save(&cookies, &session, config) {
                return OAuthError::Internal(format!("failed to sign session token: {err}"))
                    .into_response();
            }

            if resume_authorize {
                info!("Redirecting back to the authorization dialog");
                Redirect::to("/authorize").into_response()
            } else {
                Redirect::to("/").into_response()
            }
        }
        Ok(None) => {
            info!("Invalid credentials for {identifier}");
            // Explicit failure payload: the caller must be able to tell bad
            // credentials apart from "not yet authenticated".
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({
                    "error": "access_denied",
                    "error_description": "invalid credentials",
                })),
            )
                .into_response()
        }
        Err(err) => {
            warn!("Login failed on store error: {err}");
            OAuthError::from(err).into_response()
        }
    }
}

async fn logout(cookies: Cookies) -> Redirect {
    session::clear(&cookies);
    Redirect::to("/login")
}

/// Issue a one-time login code and hand it to the SMS gateway. Delivery is
/// fire-and-forget: the response is 200 regardless of the gateway outcome.
#[utoipa::path(
    post,
    path = "/request/code",
    request_body = RequestCodeBody,
    responses(
        (status = 200, description = "Code issued", body = RequestCodeResponse)
    ),
    tag = LOGIN_TAG
)]
async fn request_code(
    State(state): State<AppState>,
    Json(body): Json<RequestCodeBody>,
) -> Response {
    let directory = UserDirectory::new(state.store.clone(), state.config.clone());
    let code = match directory.issue_one_time_code(&body.phone).await {
        Ok(code) => code,
        Err(err) => {
            warn!("Failed to issue one-time code: {err}");
            return OAuthError::from(err).into_response();
        }
    };

    // The code is persisted at this point; a delivery failure must not
    // corrupt store state or the response status.
    let delivered = state.sms.deliver(&body.phone, &code).await;
    if let Err(err) = &delivered {
        warn!("One-time code delivery failed: {err}");
    }

    Json(RequestCodeResponse {
        result: delivered.is_ok(),
        response: if delivered.is_ok() {
            "one-time code dispatched".to_string()
        } else {
            "one-time code issued, delivery failed".to_string()
        },
    })
    .into_response()
}
