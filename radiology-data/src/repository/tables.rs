use async_trait::async_trait;
use tracing::{debug, error};

use crate::database::DatabasePool;
use crate::models::Row;
use super::errors::RepositoryError;
use super::in_memory::InMemoryStorage;
use super::storage::{resolve_backend, Backend, DatabaseStorage};

/// Tables this repository serves generic rows for
pub const KNOWN_TABLES: [&str; 3] = ["appointments", "examinations", "patients"];

fn ensure_known_table(table: &str) -> Result<(), RepositoryError> {
    if KNOWN_TABLES.contains(&table) {
        Ok(())
    } else {
        Err(RepositoryError::UnknownTable(table.to_string()))
    }
}

/// Repository trait for generic single-row table access
#[async_trait]
pub trait TableRepositoryTrait {
    /// Fetch one row by primary key
    async fn fetch_row(&self, table: &str, id: &str) -> Result<Option<Row>, RepositoryError>;

    /// Insert or replace one row; the row must carry an `id`
    async fn upsert_row(&self, table: &str, row: Row) -> Result<(), RepositoryError>;
}

/// Table repository backed by the shared database pool
///
/// Rows live in memory only until a pool has been initialized.
#[derive(Debug, Clone, Default)]
pub struct TableRepository {
    storage: InMemoryStorage,
    pool: Option<DatabasePool>,
}

impl TableRepository {
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
}

#[async_trait]
impl TableRepositoryTrait for TableRepository {
    async fn fetch_row(&self, table: &str, id: &str) -> Result<Option<Row>, RepositoryError> {
        ensure_known_table(table)?;

        match resolve_backend(self.pool.as_ref())? {
            Backend::Database(pool) => {
                debug!("Fetching {} row {} from database", table, id);
                DatabaseStorage::fetch_row(&pool, table, id).await.map_err(|e| {
                    error!("Failed to fetch row from database: {}", e);
                    e
                })
            }
            Backend::Memory => {
                debug!("Database not initialized, using in-memory storage for fetch_row");
                self.storage.fetch_row(table, id).await
            }
        }
    }

    async fn upsert_row(&self, table: &str, row: Row) -> Result<(), RepositoryError> {
        ensure_known_table(table)?;

        match resolve_backend(self.pool.as_ref())? {
            Backend::Database(pool) => {
                debug!("Storing {} row in database", table);
                DatabaseStorage::upsert_row(&pool, table, &row).await.map_err(|e| {
                    error!("Failed to store row in database: {}", e);
                    e
                })
            }
            Backend::Memory => {
                debug!("Database not initialized, using in-memory storage for upsert_row");
                self.storage.upsert_row(table, row).await
            }
        }
    }
}

/// Mock table repository for testing
#[cfg(any(test, feature = "mock"))]
pub mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Mock implementation of TableRepositoryTrait that never touches the database
    #[derive(Default)]
    pub struct MockTableRepository {
        rows: Mutex<HashMap<(String, String), Row>>,
        fail: bool,
    }

    impl MockTableRepository {
        /// Create a new empty mock repository
        pub fn new() -> Self {
            Self::default()
        }

        /// Preload a row
        pub fn with_row(self, table: &str, row: Row) -> Self {
            let id = super::super::in_memory::row_id(&row).unwrap_or_default();
            if let Ok(mut rows) = self.rows.lock() {
                rows.insert((table.to_string(), id), row);
            }
            self
        }

        /// Make every call fail with a database error
        pub fn failing() -> Self {
            Self { fail: true, ..Self::default() }
        }
    }

    #[async_trait]
    impl TableRepositoryTrait for MockTableRepository {
        async fn fetch_row(&self, table: &str, id: &str) -> Result<Option<Row>, RepositoryError> {
            if self.fail {
                return Err(RepositoryError::Database(crate::database::DatabaseError::GenericError(
                    "mock failure".to_string(),
                )));
            }
            ensure_known_table(table)?;
            let rows = self.rows.lock()?;
            Ok(rows.get(&(table.to_string(), id.to_string())).cloned())
        }

        async fn upsert_row(&self, table: &str, row: Row) -> Result<(), RepositoryError> {
            ensure_known_table(table)?;
            let id = super::super::in_memory::row_id(&row)?;
            let mut rows = self.rows.lock()?;
            rows.insert((table.to_string(), id), row);
            Ok(())
        }
    }

    #[cfg(test)]
    #[tokio::test]
    async fn test_unknown_table_is_rejected() {
        let repo = TableRepository::new();
        assert!(matches!(
            repo.fetch_row("billing_answers", "x").await,
            Err(RepositoryError::UnknownTable(_))
        ));
    }

    #[cfg(test)]
    #[tokio::test]
    async fn test_mock_repository_lookup() {
        let row = serde_json::json!({"id": "apt-1", "status": "booked"})
            .as_object()
            .cloned()
            .unwrap();
        let repo = MockTableRepository::new().with_row("appointments", row);

        assert!(repo.fetch_row("appointments", "apt-1").await.unwrap().is_some());
        assert!(repo.fetch_row("patients", "apt-1").await.unwrap().is_none());
        assert!(MockTableRepository::failing().fetch_row("patients", "x").await.is_err());
    }
}

#[cfg(test)]
mod database_tests {
    use super::*;
    use crate::repository::storage::tests::memory_pool;

    fn patient() -> Row {
        serde_json::json!({"id": "p-1", "first_name": "Ada", "last_name": "Lovelace"})
            .as_object()
            .cloned()
            .unwrap()
    }

    #[tokio::test]
    async fn test_rows_round_through_explicit_pool() {
        let repo = TableRepository::with_pool(memory_pool());
        repo.upsert_row("patients", patient()).await.unwrap();

        let row = repo.fetch_row("patients", "p-1").await.unwrap().unwrap();
        assert_eq!(row["last_name"], "Lovelace");
    }

    #[tokio::test]
    async fn test_fetch_failure_is_not_a_missing_row() {
        let pool = memory_pool();
        let DatabasePool::SQLite(ref sqlite) = pool;
        sqlite.get().unwrap().execute_batch("DROP TABLE patients;").unwrap();

        let repo = TableRepository::with_pool(pool.clone());
        assert!(repo.fetch_row("patients", "p-1").await.is_err());
    }

    #[tokio::test]
    async fn test_failed_write_does_not_land_in_memory() {
        let pool = memory_pool();
        let DatabasePool::SQLite(ref sqlite) = pool;
        sqlite
            .get()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER reject_patients BEFORE INSERT ON patients
                 BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
            )
            .unwrap();

        let storage = InMemoryStorage::new();
        let repo = TableRepository { storage: storage.clone(), pool: Some(pool.clone()) };
        assert!(repo.upsert_row("patients", patient()).await.is_err());
        assert!(storage.fetch_row("patients", "p-1").await.unwrap().is_none());
    }
}
