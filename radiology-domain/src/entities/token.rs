use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[cfg(feature = "with-api")]
use utoipa::ToSchema;

/// Payload carried inside a signed form-link token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
    /// Appointment the link grants access to
    pub appointment_id: String,
    /// Examination booked for the appointment
    pub examination_id: String,
    /// Expiry as Unix seconds; tokens without it do not expire
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// Issue time as Unix seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

/// Identifiers resolved from a valid token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(ToSchema))]
pub struct TokenClaims {
    /// Appointment the link grants access to
    pub appointment_id: String,
    /// Examination booked for the appointment
    pub examination_id: String,
}

impl From<TokenPayload> for TokenClaims {
    fn from(payload: TokenPayload) -> Self {
        Self {
            appointment_id: payload.appointment_id,
            examination_id: payload.examination_id,
        }
    }
}

/// A freshly issued form link for an appointment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(ToSchema))]
pub struct FormLink {
    /// Signed token to embed in the patient link
    pub token: String,
    pub appointment_id: String,
    pub examination_id: String,
    /// Moment the token stops validating
    pub expires_at: DateTime<Utc>,
}
