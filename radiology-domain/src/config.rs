//! Token configuration loaded from environment variables

use std::env;
use chrono::Duration;
use tracing::{info, warn};

use crate::auth::token::{TokenError, TokenSigner};

/// Default lifetime of an issued form link, in hours
pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 72;

/// Configuration of the signed-token subsystem
#[derive(Clone, Default)]
pub struct TokenConfig {
    /// Shared HMAC secret; `None` when `TOKEN_SECRET` is unset
    pub secret: Option<String>,
    /// Lifetime of newly issued tokens
    pub ttl_hours: i64,
    /// Remote validation endpoint used by the proxied table read
    pub validation_url: Option<String>,
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("ttl_hours", &self.ttl_hours)
            .field("validation_url", &self.validation_url)
            .finish()
    }
}

impl TokenConfig {
    /// Create a configuration with an explicit secret
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            secret: Some(secret.into()),
            ttl_hours: DEFAULT_TOKEN_TTL_HOURS,
            validation_url: None,
        }
    }

    /// Load the configuration from `TOKEN_SECRET`, `TOKEN_TTL_HOURS` and
    /// `TOKEN_VALIDATION_URL`
    pub fn from_env() -> Self {
        let secret = env::var("TOKEN_SECRET").ok().filter(|s| !s.is_empty());
        if secret.is_none() {
            warn!("TOKEN_SECRET is not set; token validation requests will fail");
        }

        let ttl_hours = env::var("TOKEN_TTL_HOURS")
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .filter(|h| *h > 0)
            .unwrap_or(DEFAULT_TOKEN_TTL_HOURS);

        let validation_url = env::var("TOKEN_VALIDATION_URL").ok().filter(|s| !s.is_empty());
        match validation_url {
            Some(ref url) => info!("Proxied table reads validate tokens remotely at {}", url),
            None => info!("Proxied table reads validate tokens in process"),
        }

        Self {
            secret,
            ttl_hours,
            validation_url,
        }
    }

    /// Lifetime of issued tokens
    pub fn ttl(&self) -> Duration {
        Duration::hours(self.ttl_hours)
    }

    /// Build a signer from the configured secret
    pub fn signer(&self) -> Result<TokenSigner, TokenError> {
        match self.secret {
            Some(ref secret) => TokenSigner::new(secret.as_bytes()),
            None => Err(TokenError::Config("TOKEN_SECRET environment variable not found".to_string())),
        }
    }
}
