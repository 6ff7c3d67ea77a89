use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::{Map, Value};
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;

use crate::auth::logging::log_token_issued;
use crate::entities::token::{TokenClaims, TokenPayload};

type HmacSha256 = Hmac<Sha256>;

/// Expiry values above this are taken to be Unix milliseconds
const MILLISECOND_EXP_THRESHOLD: i64 = 100_000_000_000;

/// Errors raised while issuing or verifying form-link tokens
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// Token is not `payload.signature` with decodable parts
    #[error("Malformed token")]
    Malformed,

    /// Signature does not match the payload
    #[error("Invalid token signature")]
    InvalidSignature,

    /// Payload lacks a required identifier
    #[error("Token payload is missing {0}")]
    MissingField(&'static str),

    /// `exp` lies in the past
    #[error("Token has expired")]
    Expired,

    /// Server-side configuration problem
    #[error("Token configuration error: {0}")]
    Config(String),
}

impl TokenError {
    /// Whether the caller sent a bad token, as opposed to a server fault
    pub fn is_client_error(&self) -> bool {
        !matches!(self, TokenError::Config(_))
    }
}

/// Signs and verifies `base64(payload).base64(hmac_sha256(payload))` tokens
#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner").field("secret", &"<redacted>").finish()
    }
}

impl TokenSigner {
    /// Create a signer; an empty secret is rejected
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, TokenError> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(TokenError::Config("token secret must not be empty".to_string()));
        }
        Ok(Self { secret: secret.to_vec() })
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| TokenError::Config(format!("failed to create HMAC: {}", e)))
    }

    /// Sign an arbitrary payload
    pub fn sign_payload(&self, payload: &TokenPayload) -> Result<String, TokenError> {
        let payload_json = serde_json::to_vec(payload)
            .map_err(|e| TokenError::Config(format!("failed to serialize payload: {}", e)))?;

        let mut mac = self.mac()?;
        mac.update(&payload_json);
        let signature = mac.finalize().into_bytes();

        Ok(format!("{}.{}", STANDARD.encode(&payload_json), STANDARD.encode(signature)))
    }

    /// Issue a form link token for an appointment, valid for `ttl` from `now`
    pub fn issue(
        &self,
        appointment_id: &str,
        examination_id: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        if appointment_id.trim().is_empty() {
            return Err(TokenError::MissingField("appointment_id"));
        }
        if examination_id.trim().is_empty() {
            return Err(TokenError::MissingField("examination_id"));
        }

        let expires = now + ttl;
        let payload = TokenPayload {
            appointment_id: appointment_id.to_string(),
            examination_id: examination_id.to_string(),
            exp: Some(expires.timestamp()),
            iat: Some(now.timestamp()),
        };

        let token = self.sign_payload(&payload)?;
        log_token_issued(&token, appointment_id);
        debug!("Token expiration: {}", expires);
        Ok(token)
    }

    /// Verify a token and return the identifiers it grants access to
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims, TokenError> {
        let mut parts = token.trim().split('.');
        let (payload_part, signature_part) = match (parts.next(), parts.next(), parts.next()) {
            (Some(p), Some(s), None) if !p.is_empty() && !s.is_empty() => (p, s),
            _ => return Err(TokenError::Malformed),
        };

        let payload_bytes = decode_base64(payload_part)?;
        let signature = decode_base64(signature_part)?;

        let mut mac = self.mac()?;
        mac.update(&payload_bytes);
        mac.verify_slice(&signature).map_err(|_| TokenError::InvalidSignature)?;

        let payload: Map<String, Value> = match serde_json::from_slice(&payload_bytes) {
            Ok(Value::Object(map)) => map,
            _ => return Err(TokenError::Malformed),
        };

        let payload = TokenPayload {
            appointment_id: identifier_field(&payload, "appointment_id")?,
            examination_id: identifier_field(&payload, "examination_id")?,
            exp: timestamp_field(&payload, "exp")?,
            iat: timestamp_field(&payload, "iat")?,
        };

        if let Some(exp) = payload.exp {
            if exp < now.timestamp() {
                debug!("Token for appointment {} expired at {}", payload.appointment_id, exp);
                return Err(TokenError::Expired);
            }
        }

        Ok(payload.into())
    }
}

/// Decode standard or URL-safe base64, padded or not
fn decode_base64(input: &str) -> Result<Vec<u8>, TokenError> {
    STANDARD
        .decode(input)
        .or_else(|_| STANDARD_NO_PAD.decode(input))
        .or_else(|_| URL_SAFE.decode(input))
        .or_else(|_| URL_SAFE_NO_PAD.decode(input))
        .map_err(|_| TokenError::Malformed)
}

/// Read a non-empty identifier; numeric ids are rendered as strings
fn identifier_field(payload: &Map<String, Value>, name: &'static str) -> Result<String, TokenError> {
    match payload.get(name) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(TokenError::MissingField(name)),
    }
}

/// Read an optional Unix timestamp in seconds (milliseconds are converted)
fn timestamp_field(payload: &Map<String, Value>, name: &str) -> Result<Option<i64>, TokenError> {
    let raw = match payload.get(name) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.floor() as i64))
            .ok_or(TokenError::Malformed)?,
        Some(_) => return Err(TokenError::Malformed),
    };

    if raw > MILLISECOND_EXP_THRESHOLD {
        Ok(Some(raw / 1000))
    } else {
        Ok(Some(raw))
    }
}
