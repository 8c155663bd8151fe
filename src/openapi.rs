use utoipa::OpenApi;

pub(crate) const HEALTH_TAG: &str = "Health API";
pub(crate) const LOGIN_TAG: &str = "Login API";
pub(crate) const OAUTH_TAG: &str = "OAuth 2.0";
pub(crate) const RESOURCE_TAG: &str = "Protected Resources";

#[derive(OpenApi)]
#[openapi(
    tags(
        (name = HEALTH_TAG, description = "Health check endpoints"),
        (name = LOGIN_TAG, description = "Resource-owner login and one-time codes"),
        (name = OAUTH_TAG, description = "Authorization and token endpoints"),
        (name = RESOURCE_TAG, description = "Token-protected sample resources"),
    ),
    info(
        title = "OAuth Server API",
        description = "OAuth2 credential-issuance service",
        version = "0.1.0"
    )
)]
pub(crate) struct ApiDoc;
