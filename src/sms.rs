//! Outbound one-time-code delivery through an external SMS gateway.

use crate::config::sms::SmsConfig;
use log::{debug, info, warn};
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while handing a code to the gateway
#[derive(Debug, Error)]
pub enum SmsError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Gateway rejected delivery: {0}")]
    Gateway(String),
}

/// Client for the SMS delivery collaborator.
///
/// Delivery is decoupled from the credential store: the code is already
/// persisted before this client is invoked, so a gateway failure can never
/// corrupt store state.
#[derive(Clone)]
pub struct SmsGateway {
    client: Client,
    config: SmsConfig,
}

impl SmsGateway {
    pub fn new(config: SmsConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout))
            .connect_timeout(Duration::from_secs(2))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .build()
            .expect("Failed to create SMS gateway client");

        Self { client, config }
    }

    /// Hand a one-time code to the gateway for delivery to `phone`.
    pub async fn deliver(&self, phone: &str, code: &str) -> Result<(), SmsError> {
        if !self.config.enabled {
            info!("SMS delivery disabled, code for {phone} not sent");
            return Ok(());
        }

        debug!("Dispatching one-time code to {phone}");
        let response = self
            .client
            .post(&self.config.gateway_url)
            .json(&json!({
                "phone": phone,
                "message": format!("Your login code is {code}"),
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            warn!("SMS gateway answered {status} for {phone}");
            return Err(SmsError::Gateway(format!("gateway answered {status}")));
        }

        info!("One-time code dispatched to {phone}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway_config(url: String, enabled: bool) -> SmsConfig {
        SmsConfig {
            enabled,
            gateway_url: url,
            request_timeout: 5,
        }
    }

    #[tokio::test]
    async fn test_delivery_posts_to_gateway() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(body_partial_json(serde_json::json!({"phone": "13759947708"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let gateway = SmsGateway::new(gateway_config(server.uri(), true));
        gateway
            .deliver("13759947708", "042531")
            .await
            .expect("delivery succeeds");
    }

    #[tokio::test]
    async fn test_gateway_failure_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let gateway = SmsGateway::new(gateway_config(server.uri(), true));
        let result = gateway.deliver("13759947708", "042531").await;
        assert!(matches!(result, Err(SmsError::Gateway(_))));
    }

    #[tokio::test]
    async fn test_disabled_gateway_skips_delivery() {
        let gateway = SmsGateway::new(gateway_config("http://unused".to_string(), false));
        assert!(gateway.deliver("13759947708", "042531").await.is_ok());
    }
}
