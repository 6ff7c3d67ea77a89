use async_trait::async_trait;
use tracing::{debug, error};

use crate::database::DatabasePool;
use crate::models::{BillingAnswerRecord, BillingFormRecord, BillingOptionRecord, BillingQuestionRecord};
use super::errors::RepositoryError;
use super::in_memory::InMemoryStorage;
use super::storage::{resolve_backend, Backend, DatabaseStorage};

/// Repository trait for billing forms and their answers
#[async_trait]
pub trait BillingRepositoryTrait {
    /// Get a form by ID
    async fn get_form(&self, form_id: &str) -> Result<Option<BillingFormRecord>, RepositoryError>;

    /// Get the questions of a form ordered by position
    async fn get_questions(&self, form_id: &str) -> Result<Vec<BillingQuestionRecord>, RepositoryError>;

    /// Get the options of every question of a form
    async fn get_options(&self, form_id: &str) -> Result<Vec<BillingOptionRecord>, RepositoryError>;

    /// Store a form definition with its questions and options
    async fn save_form(
        &self,
        form: BillingFormRecord,
        questions: Vec<BillingQuestionRecord>,
        options: Vec<BillingOptionRecord>,
    ) -> Result<(), RepositoryError>;

    /// Get the stored answers of an appointment for a form
    async fn get_answers(&self, appointment_id: &str, form_id: &str) -> Result<Vec<BillingAnswerRecord>, RepositoryError>;

    /// Replace every stored answer of an appointment for a form
    ///
    /// Returns the number of rows written.
    async fn replace_answers(
        &self,
        appointment_id: &str,
        form_id: &str,
        rows: Vec<BillingAnswerRecord>,
    ) -> Result<usize, RepositoryError>;
}

/// Billing repository backed by the shared database pool
///
/// In-memory storage is only used while no pool has been initialized.
/// Database failures are returned to the caller.
#[derive(Debug, Clone, Default)]
pub struct BillingRepository {
    storage: InMemoryStorage,
    pool: Option<DatabasePool>,
}

impl BillingRepository {
    /// Create a new repository
    pub fn new() -> Self {
        Self {
            storage: InMemoryStorage::new(),
            pool: None,
        }
    }

    /// Create a repository over an existing in-memory store
    pub fn with_storage(storage: InMemoryStorage) -> Self {
        Self { storage, pool: None }
    }

    /// Create a repository bound to a specific pool instead of the shared one
    pub fn with_pool(pool: DatabasePool) -> Self {
        Self {
            storage: InMemoryStorage::new(),
            pool: Some(pool),
        }
    }

    fn backend(&self) -> Result<Backend, RepositoryError> {
        resolve_backend(self.pool.as_ref())
    }
}

fn log_failure(operation: &str, e: RepositoryError) -> RepositoryError {
    error!("Failed to {} in database: {}", operation, e);
    e
}

#[async_trait]
impl BillingRepositoryTrait for BillingRepository {
    async fn get_form(&self, form_id: &str) -> Result<Option<BillingFormRecord>, RepositoryError> {
        match self.backend()? {
            Backend::Database(pool) => DatabaseStorage::get_form(&pool, form_id)
                .await
                .map_err(|e| log_failure("get billing form", e)),
            Backend::Memory => {
                debug!("Database not initialized, using in-memory storage for get_form");
                self.storage.get_form(form_id).await
            }
        }
    }

    async fn get_questions(&self, form_id: &str) -> Result<Vec<BillingQuestionRecord>, RepositoryError> {
        match self.backend()? {
            Backend::Database(pool) => DatabaseStorage::get_questions(&pool, form_id)
                .await
                .map_err(|e| log_failure("get billing questions", e)),
            Backend::Memory => self.storage.get_questions(form_id).await,
        }
    }

    async fn get_options(&self, form_id: &str) -> Result<Vec<BillingOptionRecord>, RepositoryError> {
        match self.backend()? {
            Backend::Database(pool) => DatabaseStorage::get_options(&pool, form_id)
                .await
                .map_err(|e| log_failure("get billing options", e)),
            Backend::Memory => self.storage.get_options(form_id).await,
        }
    }

    async fn save_form(
        &self,
        form: BillingFormRecord,
        questions: Vec<BillingQuestionRecord>,
        options: Vec<BillingOptionRecord>,
    ) -> Result<(), RepositoryError> {
        match self.backend()? {
            Backend::Database(pool) => DatabaseStorage::save_form(&pool, &form, &questions, &options)
                .await
                .map_err(|e| log_failure("save billing form", e)),
            Backend::Memory => {
                debug!("Database not initialized, using in-memory storage for save_form");
                self.storage.save_form(&form, &questions, &options).await
            }
        }
    }

    async fn get_answers(&self, appointment_id: &str, form_id: &str) -> Result<Vec<BillingAnswerRecord>, RepositoryError> {
        match self.backend()? {
            Backend::Database(pool) => DatabaseStorage::get_answers(&pool, appointment_id, form_id)
                .await
                .map_err(|e| log_failure("get billing answers", e)),
            Backend::Memory => self.storage.get_answers(appointment_id, form_id).await,
        }
    }

    async fn replace_answers(
        &self,
        appointment_id: &str,
        form_id: &str,
        rows: Vec<BillingAnswerRecord>,
    ) -> Result<usize, RepositoryError> {
        match self.backend()? {
            Backend::Database(pool) => DatabaseStorage::replace_answers(&pool, appointment_id, form_id, &rows)
                .await
                .map_err(|e| log_failure("replace billing answers", e)),
            Backend::Memory => {
                debug!("Database not initialized, using in-memory storage for replace_answers");
                self.storage.replace_answers(appointment_id, form_id, &rows).await
            }
        }
    }
}

/// Mock billing repository for testing
#[cfg(any(test, feature = "mock"))]
pub mod tests {
    use super::*;

    /// Mock implementation of BillingRepositoryTrait backed only by memory
    #[derive(Default, Clone)]
    pub struct MockBillingRepository {
        storage: InMemoryStorage,
    }

    impl MockBillingRepository {
        /// Create a new empty mock repository
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl BillingRepositoryTrait for MockBillingRepository {
        async fn get_form(&self, form_id: &str) -> Result<Option<BillingFormRecord>, RepositoryError> {
            self.storage.get_form(form_id).await
        }

        async fn get_questions(&self, form_id: &str) -> Result<Vec<BillingQuestionRecord>, RepositoryError> {
            self.storage.get_questions(form_id).await
        }

        async fn get_options(&self, form_id: &str) -> Result<Vec<BillingOptionRecord>, RepositoryError> {
            self.storage.get_options(form_id).await
        }

        async fn save_form(
            &self,
            form: BillingFormRecord,
            questions: Vec<BillingQuestionRecord>,
            options: Vec<BillingOptionRecord>,
        ) -> Result<(), RepositoryError> {
            self.storage.save_form(&form, &questions, &options).await
        }

        async fn get_answers(&self, appointment_id: &str, form_id: &str) -> Result<Vec<BillingAnswerRecord>, RepositoryError> {
            self.storage.get_answers(appointment_id, form_id).await
        }

        async fn replace_answers(
            &self,
            appointment_id: &str,
            form_id: &str,
            rows: Vec<BillingAnswerRecord>,
        ) -> Result<usize, RepositoryError> {
            self.storage.replace_answers(appointment_id, form_id, &rows).await
        }
    }
}

#[cfg(test)]
mod database_tests {
    use super::*;
    use chrono::Utc;
    use crate::repository::storage::tests::memory_pool;

    fn answer(id: &str) -> BillingAnswerRecord {
        BillingAnswerRecord {
            id: id.to_string(),
            appointment_id: "a1".to_string(),
            billing_form_id: "f1".to_string(),
            question_id: "q1".to_string(),
            option_id: Some("o1".to_string()),
            answer_text: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_failed_insert_is_reported() {
        let pool = memory_pool();
        let repo = BillingRepository::with_pool(pool.clone());
        repo.replace_answers("a1", "f1", vec![answer("r1")]).await.unwrap();

        let DatabasePool::SQLite(ref sqlite) = pool;
        sqlite
            .get()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER reject_answers BEFORE INSERT ON billing_answers
                 BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
            )
            .unwrap();

        let result = repo.replace_answers("a1", "f1", vec![answer("r2")]).await;
        assert!(matches!(result, Err(RepositoryError::Sqlite(_))));

        // The transaction rolled back, so the earlier answer is still there
        let stored = repo.get_answers("a1", "f1").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, "r1");
    }

    #[tokio::test]
    async fn test_read_failure_is_reported() {
        let pool = memory_pool();
        let DatabasePool::SQLite(ref sqlite) = pool;
        sqlite.get().unwrap().execute_batch("DROP TABLE billing_forms;").unwrap();

        let repo = BillingRepository::with_pool(pool.clone());
        assert!(repo.get_form("f1").await.is_err());
    }
}
