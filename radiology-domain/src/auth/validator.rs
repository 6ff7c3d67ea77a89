use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error};

use crate::auth::logging::log_token_validation;
use crate::auth::token::{TokenError, TokenSigner};
use crate::config::TokenConfig;
use crate::entities::token::TokenClaims;

/// Errors raised while resolving a token to its claims
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenValidationError {
    /// Token was checked locally and refused
    #[error(transparent)]
    Token(#[from] TokenError),

    /// Remote validation endpoint could not be reached or answered garbage
    #[error("Token validation unavailable: {0}")]
    Unavailable(String),

    /// Remote validation endpoint refused the token
    #[error("{0}")]
    Rejected(String),
}

impl TokenValidationError {
    /// Whether the caller sent a bad token, as opposed to a server fault
    pub fn is_client_error(&self) -> bool {
        match self {
            TokenValidationError::Token(e) => e.is_client_error(),
            TokenValidationError::Rejected(_) => true,
            TokenValidationError::Unavailable(_) => false,
        }
    }
}

/// Resolves a signed token into the identifiers it grants access to
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenValidatorTrait: Send + Sync {
    /// Validate a token
    async fn validate(&self, token: &str) -> Result<TokenClaims, TokenValidationError>;
}

/// Validates tokens in process with the configured secret
#[derive(Debug, Clone)]
pub struct LocalTokenValidator {
    signer: Result<TokenSigner, TokenError>,
}

impl LocalTokenValidator {
    /// Create a validator from the token configuration
    ///
    /// A missing secret is not an error here; every validation then fails
    /// with a configuration error.
    pub fn new(config: &TokenConfig) -> Self {
        Self {
            signer: config.signer(),
        }
    }

    /// Create a validator around an existing signer
    pub fn with_signer(signer: TokenSigner) -> Self {
        Self { signer: Ok(signer) }
    }
}

#[async_trait]
impl TokenValidatorTrait for LocalTokenValidator {
    async fn validate(&self, token: &str) -> Result<TokenClaims, TokenValidationError> {
        let signer = self.signer.as_ref().map_err(|e| {
            error!("Token validation is not configured: {}", e);
            TokenValidationError::Token(e.clone())
        })?;

        match signer.verify(token, Utc::now()) {
            Ok(claims) => {
                log_token_validation(token, Some(&claims.appointment_id), None);
                Ok(claims)
            }
            Err(e) => {
                log_token_validation(token, None, Some(&e.to_string()));
                Err(e.into())
            }
        }
    }
}

/// Response envelope of the validation function
#[derive(Debug, Deserialize)]
struct ValidationEnvelope {
    success: bool,
    data: Option<TokenClaims>,
    error: Option<String>,
}

/// Validates tokens by calling the token validation function over HTTP
#[derive(Debug, Clone)]
pub struct RemoteTokenValidator {
    client: Client,
    url: String,
}

impl RemoteTokenValidator {
    /// Create a validator for the given endpoint
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl TokenValidatorTrait for RemoteTokenValidator {
    async fn validate(&self, token: &str) -> Result<TokenClaims, TokenValidationError> {
        debug!("Validating token remotely at {}", self.url);

        let response = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "token": token }))
            .send()
            .await
            .map_err(|e| {
                error!("Token validation request failed: {}", e);
                TokenValidationError::Unavailable(e.to_string())
            })?;

        let status = response.status();
        let envelope: ValidationEnvelope = response.json().await.map_err(|e| {
            error!("Token validation returned an unreadable body ({}): {}", status, e);
            TokenValidationError::Unavailable(format!("unexpected response from validator: {}", status))
        })?;

        match envelope {
            ValidationEnvelope { success: true, data: Some(claims), .. } => {
                log_token_validation(token, Some(&claims.appointment_id), None);
                Ok(claims)
            }
            ValidationEnvelope { error, .. } => {
                let message = error.unwrap_or_else(|| "Invalid token".to_string());
                log_token_validation(token, None, Some(&message));
                if status.is_server_error() {
                    Err(TokenValidationError::Unavailable(message))
                } else {
                    Err(TokenValidationError::Rejected(message))
                }
            }
        }
    }
}

/// Build the validator selected by the configuration
pub fn create_validator(config: &TokenConfig) -> std::sync::Arc<dyn TokenValidatorTrait> {
    match config.validation_url {
        Some(ref url) => std::sync::Arc::new(RemoteTokenValidator::new(url.clone())),
        None => std::sync::Arc::new(LocalTokenValidator::new(config)),
    }
}
