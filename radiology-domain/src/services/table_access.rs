use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, error, instrument};

use radiology_data::models::Row;
use radiology_data::repository::{RepositoryError, TableRepository, TableRepositoryTrait};

use crate::auth::logging::log_table_read;
use crate::auth::validator::{TokenValidationError, TokenValidatorTrait};

/// Tables that may be read through a form-link token
pub const ALLOWED_TABLES: [&str; 3] = ["appointments", "examinations", "patients"];

/// Longest identifier accepted as a table name
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Whether `name` matches `^[A-Za-z_][A-Za-z0-9_]*$` within the length limit
pub fn is_safe_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    name.len() <= MAX_IDENTIFIER_LEN && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Proxied table read errors
#[derive(Debug, Error)]
pub enum TableAccessError {
    /// Table name is not readable by token
    #[error("Invalid table name: {0}")]
    InvalidTable(String),

    /// Token could not be resolved
    #[error(transparent)]
    Token(#[from] TokenValidationError),

    /// No row for the appointment
    #[error("No {table} row found for appointment {appointment_id}")]
    NotFound {
        table: String,
        appointment_id: String,
    },

    /// Repository error
    #[error("Repository error: {0}")]
    Repository(String),
}

/// Trait for reading a single row on behalf of a token holder
#[async_trait]
pub trait TableAccessServiceTrait {
    /// Resolve the token and return the row of `table_name` whose primary key
    /// is the token's appointment id
    async fn read_by_token(&self, token: &str, table_name: &str) -> Result<Row, TableAccessError>;
}

/// Proxied read service
pub struct TableAccessService {
    validator: Arc<dyn TokenValidatorTrait>,
    repository: Arc<dyn TableRepositoryTrait + Send + Sync>,
}

impl TableAccessService {
    /// Create a new service
    pub fn new(
        validator: Arc<dyn TokenValidatorTrait>,
        repository: Arc<dyn TableRepositoryTrait + Send + Sync>,
    ) -> Self {
        Self { validator, repository }
    }

    fn check_table(table_name: &str) -> Result<(), TableAccessError> {
        if !is_safe_identifier(table_name) || !ALLOWED_TABLES.contains(&table_name) {
            return Err(TableAccessError::InvalidTable(table_name.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TableAccessServiceTrait for TableAccessService {
    #[instrument(skip(self, token))]
    async fn read_by_token(&self, token: &str, table_name: &str) -> Result<Row, TableAccessError> {
        if let Err(e) = Self::check_table(table_name) {
            log_table_read(token, table_name, None, Some(&e.to_string()));
            return Err(e);
        }

        let claims = match self.validator.validate(token).await {
            Ok(claims) => claims,
            Err(e) => {
                log_table_read(token, table_name, None, Some(&e.to_string()));
                return Err(e.into());
            }
        };
        let appointment_id = claims.appointment_id;

        debug!("Reading {} row for appointment {}", table_name, appointment_id);
        match self.repository.fetch_row(table_name, &appointment_id).await {
            Ok(Some(row)) => {
                log_table_read(token, table_name, Some(&appointment_id), None);
                Ok(row)
            }
            Ok(None) => {
                log_table_read(token, table_name, Some(&appointment_id), Some("row not found"));
                Err(TableAccessError::NotFound {
                    table: table_name.to_string(),
                    appointment_id,
                })
            }
            Err(RepositoryError::UnknownTable(table)) => Err(TableAccessError::InvalidTable(table)),
            Err(e) => {
                error!("Failed to read {} row: {}", table_name, e);
                log_table_read(token, table_name, Some(&appointment_id), Some("repository failure"));
                Err(TableAccessError::Repository(e.to_string()))
            }
        }
    }
}

/// Type alias for the shared table access service
pub type TableAccessServiceRef = Arc<dyn TableAccessServiceTrait + Send + Sync>;

/// Shared handle to the clinic table repository
pub type TableRepositoryRef = Arc<dyn TableRepositoryTrait + Send + Sync>;

/// Create the default clinic table repository
pub fn create_table_repository() -> TableRepositoryRef {
    Arc::new(TableRepository::new())
}

/// Create a table access service over a shared repository
pub fn create_table_access_service(
    validator: Arc<dyn TokenValidatorTrait>,
    repository: TableRepositoryRef,
) -> TableAccessServiceRef {
    Arc::new(TableAccessService::new(validator, repository))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::TokenError;
    use crate::auth::validator::MockTokenValidatorTrait;
    use crate::entities::token::TokenClaims;
    use radiology_data::repository::tests::MockTableRepository;
    use serde_json::json;

    fn claims(appointment_id: &str) -> TokenClaims {
        TokenClaims {
            appointment_id: appointment_id.to_string(),
            examination_id: "exam-1".to_string(),
        }
    }

    fn accepting_validator(appointment_id: &'static str) -> Arc<dyn TokenValidatorTrait> {
        let mut validator = MockTokenValidatorTrait::new();
        validator
            .expect_validate()
            .returning(move |_| Ok(claims(appointment_id)));
        Arc::new(validator)
    }

    fn appointment_row() -> Row {
        json!({"id": "apt-1", "status": "booked"}).as_object().cloned().unwrap()
    }

    #[test]
    fn test_safe_identifier() {
        assert!(is_safe_identifier("patients"));
        assert!(is_safe_identifier("_private1"));
        assert!(!is_safe_identifier("1patients"));
        assert!(!is_safe_identifier("patients; DROP TABLE x"));
        assert!(!is_safe_identifier(""));
        assert!(!is_safe_identifier(&"a".repeat(64)));
    }

    #[tokio::test]
    async fn test_reads_row_for_token_appointment() {
        let repository = MockTableRepository::new().with_row("appointments", appointment_row());
        let service = TableAccessService::new(accepting_validator("apt-1"), Arc::new(repository));

        let row = service.read_by_token("token", "appointments").await.unwrap();
        assert_eq!(row.get("status"), Some(&json!("booked")));
    }

    #[tokio::test]
    async fn test_table_is_checked_before_token() {
        let mut validator = MockTokenValidatorTrait::new();
        validator.expect_validate().never();
        let service = TableAccessService::new(Arc::new(validator), Arc::new(MockTableRepository::new()));

        for table in ["billing_answers", "patients--", "users"] {
            let err = service.read_by_token("token", table).await.unwrap_err();
            assert!(matches!(err, TableAccessError::InvalidTable(_)), "table {}", table);
        }
    }

    #[tokio::test]
    async fn test_token_errors_are_propagated() {
        let mut validator = MockTokenValidatorTrait::new();
        validator
            .expect_validate()
            .returning(|_| Err(TokenValidationError::Token(TokenError::Expired)));
        let service = TableAccessService::new(Arc::new(validator), Arc::new(MockTableRepository::new()));

        let err = service.read_by_token("token", "patients").await.unwrap_err();
        assert!(matches!(err, TableAccessError::Token(TokenValidationError::Token(TokenError::Expired))));
    }

    #[tokio::test]
    async fn test_missing_row_is_not_found() {
        let service = TableAccessService::new(accepting_validator("apt-404"), Arc::new(MockTableRepository::new()));

        let err = service.read_by_token("token", "patients").await.unwrap_err();
        assert!(matches!(err, TableAccessError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_repository_failure() {
        let service = TableAccessService::new(accepting_validator("apt-1"), Arc::new(MockTableRepository::failing()));

        let err = service.read_by_token("token", "patients").await.unwrap_err();
        assert!(matches!(err, TableAccessError::Repository(_)));
    }
}
