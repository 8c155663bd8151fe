//! User directory: resource-owner authentication and one-time-code issuance.

use crate::config::login::LoginMode;
use crate::config::ServerConfig;
use crate::models::User;
use crate::store::{CredentialStore, Store, StoreError};
use chrono::{Duration, Utc};
use log::{debug, info};
use rand::Rng;
use std::sync::Arc;

/// Authenticates resource owners against the credential store.
///
/// The directory runs in one of two deployment modes: username/password, or
/// phone/one-time-code where the delivered code temporarily becomes the
/// user's stored credential.
#[derive(Clone)]
pub struct UserDirectory {
    store: Arc<Store>,
    config: Arc<ServerConfig>,
}

impl UserDirectory {
    pub fn new(store: Arc<Store>, config: Arc<ServerConfig>) -> Self {
        Self { store, config }
    }

    /// Authenticate by username/password or phone/one-time-code depending on
    /// the configured login mode.
    pub async fn authenticate(
        &self,
        identifier: &str,
        credential: &str,
    ) -> Result<Option<User>, StoreError> {
        debug!("Authenticating {identifier}");
        let user = self.store.get_user(identifier, credential).await?;

        let Some(user) = user else {
            return Ok(None);
        };

        if self.config.login.mode == LoginMode::OneTimeCode {
            // A code is only as fresh as the credential-update timestamp.
            let ttl = Duration::seconds(self.config.login.one_time_code_ttl as i64);
            if user.timestamp + ttl <= Utc::now() {
                info!("One-time code for {identifier} has expired");
                return Ok(None);
            }
        }

        Ok(Some(user))
    }

    /// Generate a fresh 6-digit one-time code and store it as the user's
    /// current credential, invalidating any previously issued code for the
    /// same phone. Delivery is the caller's concern.
    pub async fn issue_one_time_code(&self, phone: &str) -> Result<String, StoreError> {
        let code = generate_code();
        self.store.add_user(phone, &code).await?;
        info!("Issued one-time code for {phone}");
        Ok(code)
    }
}

/// Fixed-width numeric code, zero-padded to 6 digits.
fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    format!("{:06}", rng.gen_range(0..1_000_000u32))
}
