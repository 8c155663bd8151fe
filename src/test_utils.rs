use crate::api::oauth::models::TokenResponse;
use crate::config::ServerConfig;
use crate::create_app;
use crate::state::AppState;
use crate::store::memory::MemoryStore;
use crate::store::Store;
use axum::body::Body;
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use http::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE};
use http::{HeaderMap, Method, Request, StatusCode};
use http_body_util::BodyExt;
use log::LevelFilter;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tower::ServiceExt;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Test fixture wiring the full router against the in-memory store (seeded
/// with the demo client/user) and a mock SMS gateway.
///
/// Requests are driven through `tower::ServiceExt::oneshot`; the session
/// cookie returned by one response can be threaded into the next request to
/// walk the login/consent round trip.
pub struct TestFixture {
    /// The application router
    pub app: Router,
    /// Configuration the app was built with
    pub config: ServerConfig,
    /// Application state backing the router
    pub state: AppState,
    /// Direct handle on the in-memory tables for seeding
    pub memory: MemoryStore,
    /// Mock server standing in for the SMS gateway
    pub sms_mock: MockServer,
}

impl TestFixture {
    /// Creates a fixture with the default test configuration.
    pub async fn new() -> Self {
        Self::with_config_mut(|_| {}).await
    }

    /// Creates a fixture after letting the caller adjust the configuration.
    pub async fn with_config_mut(adjust: impl FnOnce(&mut ServerConfig)) -> Self {
        let _ = env_logger::builder()
            .filter_level(LevelFilter::Debug)
            .is_test(true)
            .try_init();

        let sms_mock = MockServer::start().await;

        let mut config = ServerConfig::for_test();
        config.sms.enabled = true;
        config.sms.gateway_url = sms_mock.uri();
        adjust(&mut config);

        let memory = MemoryStore::new();
        memory.seed_demo();

        let state = AppState::with_store(config.clone(), Store::Memory(memory.clone()));
        let app = create_app(state.clone()).await;

        Self {
            app,
            config,
            state,
            memory,
            sms_mock,
        }
    }

    /// Mount an SMS gateway mock answering 200 for `expected_calls` requests.
    pub async fn mock_sms_ok(&self, expected_calls: u64) {
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(expected_calls)
            .mount(&self.sms_mock)
            .await;
    }

    /// Mount an SMS gateway mock that fails every delivery.
    pub async fn mock_sms_failure(&self) {
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&self.sms_mock)
            .await;
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read response body")
            .to_bytes();

        let text = String::from_utf8_lossy(&body).into_owned();
        let json = if !body.is_empty() {
            serde_json::from_slice(&body).unwrap_or_else(|_| serde_json::json!({}))
        } else {
            serde_json::json!({})
        };

        TestResponse {
            status,
            headers,
            json,
            body: text,
        }
    }

    pub async fn get(&self, uri: impl AsRef<str>) -> TestResponse {
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri.as_ref())
            .body(Body::empty())
            .expect("Failed to build request");
        self.send(request).await
    }

    pub async fn get_with_cookie(&self, uri: impl AsRef<str>, cookie: &str) -> TestResponse {
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri.as_ref())
            .header(COOKIE, cookie)
            .body(Body::empty())
            .expect("Failed to build request");
        self.send(request).await
    }

    pub async fn get_with_bearer(&self, uri: impl AsRef<str>, token: &str) -> TestResponse {
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri.as_ref())
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .expect("Failed to build request");
        self.send(request).await
    }

    pub async fn post_form(&self, uri: impl AsRef<str>, fields: &[(&str, &str)]) -> TestResponse {
        self.form_request(Method::POST, uri, fields, None, None)
            .await
    }

    pub async fn put_form(&self, uri: impl AsRef<str>, fields: &[(&str, &str)]) -> TestResponse {
        self.form_request(Method::PUT, uri, fields, None, None).await
    }

    pub async fn post_form_with_cookie(
        &self,
        uri: impl AsRef<str>,
        fields: &[(&str, &str)],
        cookie: &str,
    ) -> TestResponse {
        self.form_request(Method::POST, uri, fields, Some(cookie), None)
            .await
    }

    pub async fn post_form_basic_auth(
        &self,
        uri: impl AsRef<str>,
        fields: &[(&str, &str)],
        client_id: &str,
        client_secret: &str,
    ) -> TestResponse {
        let header = format!(
            "Basic {}",
            STANDARD.encode(format!("{client_id}:{client_secret}"))
        );
        self.form_request(Method::POST, uri, fields, None, Some(header))
            .await
    }

    async fn form_request(
        &self,
        http_method: Method,
        uri: impl AsRef<str>,
        fields: &[(&str, &str)],
        cookie: Option<&str>,
        authorization: Option<String>,
    ) -> TestResponse {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();

        let mut builder = Request::builder()
            .method(http_method)
            .uri(uri.as_ref())
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        if let Some(authorization) = authorization {
            builder = builder.header(AUTHORIZATION, authorization);
        }

        let request = builder
            .body(Body::from(body))
            .expect("Failed to build request");
        self.send(request).await
    }

    pub async fn post_json<T: Serialize>(&self, uri: impl AsRef<str>, body: &T) -> TestResponse {
        let json_body = serde_json::to_vec(body).expect("Failed to serialize body to JSON");
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri.as_ref())
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(json_body))
            .expect("Failed to build request");
        self.send(request).await
    }

    /// Log the demo user in with no pending authorization; returns the
    /// authenticated session cookie.
    pub async fn login(&self) -> String {
        let response = self
            .post_form(
                "/login",
                &[("username", "wangbo@xiaoda.ai"), ("password", "00AAaa")],
            )
            .await;
        response.assert_status(StatusCode::SEE_OTHER);
        response.session_cookie().expect("login sets session cookie")
    }

    /// Walk the stash-then-login half of the authorize flow; returns a
    /// session cookie holding both the user and the pending request.
    pub async fn login_with_pending(&self, redirect_uri: &str, state: Option<&str>) -> String {
        let mut uri = format!(
            "/authorize?client_id=xiaomi&redirect_uri={redirect_uri}&response_type=code&scope="
        );
        if let Some(state) = state {
            uri.push_str(&format!("&state={state}"));
        }
        let response = self.get(&uri).await;
        response.assert_status(StatusCode::SEE_OTHER);
        let cookie = response.session_cookie().expect("pending session cookie");

        let response = self
            .post_form_with_cookie(
                "/login",
                &[("username", "wangbo@xiaoda.ai"), ("password", "00AAaa")],
                &cookie,
            )
            .await;
        response.assert_status(StatusCode::SEE_OTHER);
        response.session_cookie().expect("authenticated session cookie")
    }

    /// Issue a token pair for the demo user over the HTTP token endpoint.
    pub async fn issue_password_token(&self, scope: Option<&str>) -> TokenResponse {
        let mut fields = vec![
            ("grant_type", "password"),
            ("client_id", "xiaomi"),
            ("client_secret", "123456"),
            ("username", "wangbo@xiaoda.ai"),
            ("password", "00AAaa"),
        ];
        if let Some(scope) = scope {
            fields.push(("scope", scope));
        }
        let response = self.post_form("/token", &fields).await;
        response.assert_ok();
        response.json_as()
    }
}

/// Response from a test request with convenient access to status, headers
/// and body.
pub struct TestResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body as JSON (empty object when not JSON)
    pub json: Value,
    /// Raw response body text
    pub body: String,
}

impl TestResponse {
    /// Asserts that the response has the expected status code.
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status, expected,
            "Expected status {} but got {} with body: {}",
            expected, self.status, self.body
        );
        self
    }

    /// Asserts that the response status is OK (200).
    pub fn assert_ok(&self) -> &Self {
        self.assert_status(StatusCode::OK)
    }

    /// Converts the JSON response body to the specified type.
    pub fn json_as<T: DeserializeOwned>(&self) -> T {
        serde_json::from_value(self.json.clone()).expect("Failed to deserialize response JSON")
    }

    /// The Location header of a redirect response.
    pub fn location(&self) -> Option<String> {
        self.headers
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    }

    /// The session cookie set by this response, as a `name=value` pair ready
    /// for a Cookie header.
    pub fn session_cookie(&self) -> Option<String> {
        self.headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find(|value| value.starts_with(crate::session::SESSION_COOKIE))
            .map(|value| {
                value
                    .split(';')
                    .next()
                    .unwrap_or_default()
                    .to_string()
            })
    }
}
