use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, instrument};

use radiology_data::models::Row;
use radiology_data::repository::RepositoryError;

use crate::auth::token::{TokenError, TokenSigner};
use crate::config::TokenConfig;
use crate::entities::token::FormLink;
use crate::services::table_access::{is_safe_identifier, TableRepositoryRef, ALLOWED_TABLES};

/// Errors raised while maintaining clinic rows or issuing links
#[derive(Debug, Error)]
pub enum FormLinkError {
    /// Request does not describe a usable row or appointment
    #[error("Invalid request: {0}")]
    Invalid(String),

    /// Appointment does not exist
    #[error("Appointment {0} not found")]
    NotFound(String),

    /// Signing failed or is not configured
    #[error(transparent)]
    Token(#[from] TokenError),

    /// Repository error
    #[error("Repository error: {0}")]
    Repository(String),
}

/// Staff-side operations behind the patient form links
#[async_trait]
pub trait FormLinkServiceTrait {
    /// Insert or replace the clinic row `id` of `table`
    async fn store_row(&self, table: &str, id: &str, row: Row) -> Result<Row, FormLinkError>;

    /// Issue a signed link for a stored appointment
    async fn issue_link(&self, appointment_id: &str) -> Result<FormLink, FormLinkError>;
}

/// Form link service over the clinic tables
pub struct FormLinkService {
    repository: TableRepositoryRef,
    signer: Result<TokenSigner, TokenError>,
    ttl: Duration,
}

impl FormLinkService {
    /// Create a service signing with the configured secret and lifetime
    pub fn new(config: &TokenConfig, repository: TableRepositoryRef) -> Self {
        Self {
            repository,
            signer: config.signer(),
            ttl: config.ttl(),
        }
    }

    fn map_repo_error(err: RepositoryError) -> FormLinkError {
        match err {
            RepositoryError::Validation(msg) => FormLinkError::Invalid(msg),
            RepositoryError::UnknownTable(table) => FormLinkError::Invalid(format!("unknown table {}", table)),
            other => {
                error!("Clinic table repository failure: {}", other);
                FormLinkError::Repository(other.to_string())
            }
        }
    }
}

#[async_trait]
impl FormLinkServiceTrait for FormLinkService {
    #[instrument(skip(self, row))]
    async fn store_row(&self, table: &str, id: &str, mut row: Row) -> Result<Row, FormLinkError> {
        if !is_safe_identifier(table) || !ALLOWED_TABLES.contains(&table) {
            return Err(FormLinkError::Invalid(format!("unknown table {}", table)));
        }
        if id.trim().is_empty() {
            return Err(FormLinkError::Invalid("row id must not be empty".to_string()));
        }
        match row.get("id").map(|body_id| body_id.as_str() == Some(id)) {
            None => {
                row.insert("id".to_string(), Value::String(id.to_string()));
            }
            Some(true) => {}
            Some(false) => return Err(FormLinkError::Invalid("body id does not match the path".to_string())),
        }

        self.repository
            .upsert_row(table, row.clone())
            .await
            .map_err(Self::map_repo_error)?;

        info!("Stored {} row {}", table, id);
        Ok(row)
    }

    #[instrument(skip(self))]
    async fn issue_link(&self, appointment_id: &str) -> Result<FormLink, FormLinkError> {
        if appointment_id.trim().is_empty() {
            return Err(FormLinkError::Invalid("appointment id must not be empty".to_string()));
        }

        let appointment = self
            .repository
            .fetch_row("appointments", appointment_id)
            .await
            .map_err(Self::map_repo_error)?
            .ok_or_else(|| FormLinkError::NotFound(appointment_id.to_string()))?;

        let examination_id = match appointment.get("examination_id") {
            Some(Value::String(id)) if !id.trim().is_empty() => id.clone(),
            _ => {
                return Err(FormLinkError::Invalid(format!(
                    "appointment {} has no examination",
                    appointment_id
                )))
            }
        };

        let signer = self.signer.as_ref().map_err(|e| {
            error!("Form links cannot be issued: {}", e);
            e.clone()
        })?;

        let now = Utc::now();
        let token = signer.issue(appointment_id, &examination_id, self.ttl, now)?;

        Ok(FormLink {
            token,
            appointment_id: appointment_id.to_string(),
            examination_id,
            expires_at: now + self.ttl,
        })
    }
}

/// Type alias for the shared form link service
pub type FormLinkServiceRef = Arc<dyn FormLinkServiceTrait + Send + Sync>;

/// Create a form link service over a shared repository
pub fn create_form_link_service(config: &TokenConfig, repository: TableRepositoryRef) -> FormLinkServiceRef {
    Arc::new(FormLinkService::new(config, repository))
}

#[cfg(test)]
mod tests {
    use super::*;
    use radiology_data::repository::tests::MockTableRepository;
    use serde_json::json;

    fn appointment(examination_id: Option<&str>) -> Row {
        let mut row = json!({"id": "apt-1", "status": "booked"}).as_object().cloned().unwrap();
        if let Some(exam) = examination_id {
            row.insert("examination_id".to_string(), json!(exam));
        }
        row
    }

    fn service(repository: MockTableRepository) -> FormLinkService {
        FormLinkService::new(&TokenConfig::with_secret("link-secret"), Arc::new(repository))
    }

    #[tokio::test]
    async fn test_issued_link_verifies_for_appointment() {
        let service = service(MockTableRepository::new().with_row("appointments", appointment(Some("exam-9"))));

        let link = service.issue_link("apt-1").await.unwrap();
        assert_eq!(link.examination_id, "exam-9");
        assert!(link.expires_at > Utc::now());

        let claims = TokenSigner::new("link-secret").unwrap().verify(&link.token, Utc::now()).unwrap();
        assert_eq!(claims.appointment_id, "apt-1");
        assert_eq!(claims.examination_id, "exam-9");
    }

    #[tokio::test]
    async fn test_link_requires_stored_appointment_with_examination() {
        let service = service(MockTableRepository::new().with_row("appointments", appointment(None)));

        assert!(matches!(service.issue_link("apt-2").await, Err(FormLinkError::NotFound(_))));
        assert!(matches!(service.issue_link("apt-1").await, Err(FormLinkError::Invalid(_))));
        assert!(matches!(service.issue_link(" ").await, Err(FormLinkError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_missing_secret_is_a_token_config_error() {
        let repository = MockTableRepository::new().with_row("appointments", appointment(Some("exam-9")));
        let service = FormLinkService::new(&TokenConfig::default(), Arc::new(repository));

        assert!(matches!(
            service.issue_link("apt-1").await,
            Err(FormLinkError::Token(TokenError::Config(_)))
        ));
    }

    #[tokio::test]
    async fn test_store_row_fills_id_from_path() {
        let service = service(MockTableRepository::new());
        let row = json!({"name": "MRT Knie"}).as_object().cloned().unwrap();

        let stored = service.store_row("examinations", "exam-1", row).await.unwrap();
        assert_eq!(stored.get("id"), Some(&json!("exam-1")));

        let mismatched = json!({"id": "other"}).as_object().cloned().unwrap();
        assert!(matches!(
            service.store_row("examinations", "exam-1", mismatched).await,
            Err(FormLinkError::Invalid(_))
        ));
        assert!(matches!(
            service.store_row("billing_answers", "x", Row::new()).await,
            Err(FormLinkError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_repository_failure_is_reported() {
        let service = service(MockTableRepository::failing());
        assert!(matches!(service.issue_link("apt-1").await, Err(FormLinkError::Repository(_))));
    }
}
