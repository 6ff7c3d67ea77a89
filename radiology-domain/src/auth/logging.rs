use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

/// Types of access events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessEventType {
    /// A form link token was checked
    TokenValidation,
    /// A form link token was issued
    TokenIssued,
    /// A row was read through the token proxy
    TableRead,
    /// Billing answers were submitted
    BillingSubmission,
}

impl std::fmt::Display for AccessEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessEventType::TokenValidation => write!(f, "TOKEN_VALIDATION"),
            AccessEventType::TokenIssued => write!(f, "TOKEN_ISSUED"),
            AccessEventType::TableRead => write!(f, "TABLE_READ"),
            AccessEventType::BillingSubmission => write!(f, "BILLING_SUBMISSION"),
        }
    }
}

/// Access event record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessEvent {
    /// Type of access event
    pub event_type: AccessEventType,
    /// Appointment the access was for (if known)
    pub appointment_id: Option<String>,
    /// Timestamp when the event occurred
    pub timestamp: DateTime<Utc>,
    /// Whether the event was successful
    pub success: bool,
    /// Short fingerprint of the token, never the token itself
    pub token_fingerprint: Option<String>,
    /// The table or form being accessed (if applicable)
    pub resource: Option<String>,
    /// Additional details about the event
    pub details: Option<String>,
}

impl AccessEvent {
    /// Create a new access event
    pub fn new(event_type: AccessEventType, appointment_id: Option<&str>, success: bool) -> Self {
        Self {
            event_type,
            appointment_id: appointment_id.map(String::from),
            timestamp: Utc::now(),
            success,
            token_fingerprint: None,
            resource: None,
            details: None,
        }
    }

    /// Attach the fingerprint of a token
    pub fn with_token(mut self, token: &str) -> Self {
        self.token_fingerprint = Some(token_fingerprint(token));
        self
    }

    /// Set the resource
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Set the details
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// First 8 hex characters of the SHA-256 of a token
pub fn token_fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    digest.iter().take(4).map(|b| format!("{:02x}", b)).collect()
}

/// Log an access event
pub fn log_access_event(event: &AccessEvent) {
    let appointment = event.appointment_id.as_deref().unwrap_or("unknown");
    let fingerprint = event.token_fingerprint.as_deref().unwrap_or("-");
    let resource = event.resource.as_deref().unwrap_or("-");
    let details = event.details.as_deref().unwrap_or("");

    if event.success {
        info!(
            target: "access_audit",
            event = %event.event_type,
            appointment_id = appointment,
            token = fingerprint,
            resource = resource,
            timestamp = %event.timestamp.to_rfc3339(),
            "ACCESS-LOG [SUCCESS] {}",
            details
        );
    } else {
        warn!(
            target: "access_audit",
            event = %event.event_type,
            appointment_id = appointment,
            token = fingerprint,
            resource = resource,
            timestamp = %event.timestamp.to_rfc3339(),
            "ACCESS-LOG [FAILURE] {}",
            details
        );
    }
}

/// Log the outcome of a token validation
pub fn log_token_validation(token: &str, appointment_id: Option<&str>, failure: Option<&str>) {
    let mut event = AccessEvent::new(AccessEventType::TokenValidation, appointment_id, failure.is_none())
        .with_token(token);

    if let Some(reason) = failure {
        event = event.with_details(reason);
    }

    log_access_event(&event);
}

/// Log the issuance of a form link token
pub fn log_token_issued(token: &str, appointment_id: &str) {
    let event = AccessEvent::new(AccessEventType::TokenIssued, Some(appointment_id), true).with_token(token);
    log_access_event(&event);
}

/// Log a proxied table read
pub fn log_table_read(token: &str, table: &str, appointment_id: Option<&str>, failure: Option<&str>) {
    let mut event = AccessEvent::new(AccessEventType::TableRead, appointment_id, failure.is_none())
        .with_token(token)
        .with_resource(table);

    if let Some(reason) = failure {
        event = event.with_details(reason);
    }

    log_access_event(&event);
}

/// Log a billing submission
pub fn log_billing_submission(appointment_id: &str, form_id: &str, rows_written: usize) {
    let event = AccessEvent::new(AccessEventType::BillingSubmission, Some(appointment_id), true)
        .with_resource(format!("billing_form:{}", form_id))
        .with_details(format!("{} answer rows written", rows_written));
    log_access_event(&event);
}
