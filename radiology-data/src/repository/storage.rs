use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use tracing::debug;

use crate::database::{get_db_pool, DatabaseError, DatabasePool};
use crate::models::row::{json_to_sqlite_value, sqlite_value_to_json};
use crate::models::{BillingAnswerRecord, BillingFormRecord, BillingOptionRecord, BillingQuestionRecord, Row};
use super::errors::RepositoryError;
use super::in_memory::row_id;

/// Where a repository call is served from
#[derive(Debug, Clone)]
pub(crate) enum Backend {
    Database(DatabasePool),
    Memory,
}

/// Pick the backend for one repository call
///
/// An explicit pool wins over the shared one. In-memory storage is used only
/// when no pool was ever initialized; any other pool error is returned.
pub(crate) fn resolve_backend(explicit: Option<&DatabasePool>) -> Result<Backend, RepositoryError> {
    if let Some(pool) = explicit {
        return Ok(Backend::Database(pool.clone()));
    }

    match get_db_pool() {
        Ok(pool) => Ok(Backend::Database(pool)),
        Err(DatabaseError::PoolNotInitialized) => Ok(Backend::Memory),
        Err(e) => Err(e.into()),
    }
}

/// Database storage operations
///
/// Table and column names are interpolated into SQL, so callers must pass
/// names that have already been checked against a known list or
/// `is_sql_identifier`.
pub struct DatabaseStorage;

impl DatabaseStorage {
    /// Single-row lookup by primary key
    pub async fn fetch_row(pool: &DatabasePool, table: &str, id: &str) -> Result<Option<Row>, RepositoryError> {
        debug!("Fetching row from {} with id={}", table, id);

        match pool {
            DatabasePool::SQLite(pool) => {
                let conn = pool.get()?;
                let mut stmt = conn.prepare(&format!("SELECT * FROM {} WHERE id = ?1 LIMIT 1", table))?;
                let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

                let row = stmt
                    .query_row(params![id], |row| {
                        let mut out = Row::new();
                        for (idx, name) in columns.iter().enumerate() {
                            out.insert(name.clone(), sqlite_value_to_json(row.get_ref(idx)?));
                        }
                        Ok(out)
                    })
                    .optional()?;

                Ok(row)
            },
        }
    }

    /// Insert or replace a generic row
    pub async fn upsert_row(pool: &DatabasePool, table: &str, row: &Row) -> Result<(), RepositoryError> {
        let id = row_id(row)?;
        debug!("Upserting row into {} with id={}", table, id);

        if let Some(bad) = row.keys().find(|k| !is_sql_identifier(k)) {
            return Err(RepositoryError::Validation(format!("invalid column name: {}", bad)));
        }

        let columns: Vec<&str> = row.keys().map(String::as_str).collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            placeholders.join(", ")
        );

        match pool {
            DatabasePool::SQLite(pool) => {
                let conn = pool.get()?;
                conn.execute(&sql, params_from_iter(row.values().map(json_to_sqlite_value)))?;
                Ok(())
            },
        }
    }

    pub async fn get_form(pool: &DatabasePool, form_id: &str) -> Result<Option<BillingFormRecord>, RepositoryError> {
        match pool {
            DatabasePool::SQLite(pool) => {
                let conn = pool.get()?;
                let form = conn
                    .query_row(
                        "SELECT id, examination_id, name, created_at FROM billing_forms WHERE id = ?1",
                        params![form_id],
                        |row| {
                            Ok(BillingFormRecord {
                                id: row.get(0)?,
                                examination_id: row.get(1)?,
                                name: row.get(2)?,
                                created_at: parse_timestamp(3, row.get::<_, String>(3)?)?,
                            })
                        },
                    )
                    .optional()?;
                Ok(form)
            },
        }
    }

    pub async fn get_questions(pool: &DatabasePool, form_id: &str) -> Result<Vec<BillingQuestionRecord>, RepositoryError> {
        match pool {
            DatabasePool::SQLite(pool) => {
                let conn = pool.get()?;
                let mut stmt = conn.prepare(
                    "SELECT id, billing_form_id, question_text, question_type, required, position,
                            depends_on_question_id, depends_on_option_id
                     FROM billing_questions
                     WHERE billing_form_id = ?1
                     ORDER BY position ASC, id ASC",
                )?;

                let questions = stmt
                    .query_map(params![form_id], |row| {
                        Ok(BillingQuestionRecord {
                            id: row.get(0)?,
                            billing_form_id: row.get(1)?,
                            question_text: row.get(2)?,
                            question_type: row.get(3)?,
                            required: row.get(4)?,
                            position: row.get(5)?,
                            depends_on_question_id: row.get(6)?,
                            depends_on_option_id: row.get(7)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                Ok(questions)
            },
        }
    }

    pub async fn get_options(pool: &DatabasePool, form_id: &str) -> Result<Vec<BillingOptionRecord>, RepositoryError> {
        match pool {
            DatabasePool::SQLite(pool) => {
                let conn = pool.get()?;
                let mut stmt = conn.prepare(
                    "SELECT o.id, o.question_id, o.option_text, o.position
                     FROM billing_options o
                     JOIN billing_questions q ON q.id = o.question_id
                     WHERE q.billing_form_id = ?1
                     ORDER BY o.question_id ASC, o.position ASC",
                )?;

                let options = stmt
                    .query_map(params![form_id], |row| {
                        Ok(BillingOptionRecord {
                            id: row.get(0)?,
                            question_id: row.get(1)?,
                            option_text: row.get(2)?,
                            position: row.get(3)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                Ok(options)
            },
        }
    }

    /// Store a form definition, replacing previous questions and options
    pub async fn save_form(
        pool: &DatabasePool,
        form: &BillingFormRecord,
        questions: &[BillingQuestionRecord],
        options: &[BillingOptionRecord],
    ) -> Result<(), RepositoryError> {
        debug!("Saving billing form {} with {} questions", form.id, questions.len());

        match pool {
            DatabasePool::SQLite(pool) => {
                let mut conn = pool.get()?;
                let tx = conn.transaction()?;

                tx.execute(
                    "INSERT OR REPLACE INTO billing_forms (id, examination_id, name, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![form.id, form.examination_id, form.name, form.created_at.to_rfc3339()],
                )?;
                tx.execute(
                    "DELETE FROM billing_options WHERE question_id IN
                        (SELECT id FROM billing_questions WHERE billing_form_id = ?1)",
                    params![form.id],
                )?;
                tx.execute("DELETE FROM billing_questions WHERE billing_form_id = ?1", params![form.id])?;

                for q in questions {
                    tx.execute(
                        "INSERT INTO billing_questions
                            (id, billing_form_id, question_text, question_type, required, position,
                             depends_on_question_id, depends_on_option_id)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                        params![
                            q.id,
                            q.billing_form_id,
                            q.question_text,
                            q.question_type,
                            q.required,
                            q.position,
                            q.depends_on_question_id,
                            q.depends_on_option_id,
                        ],
                    )?;
                }

                for o in options {
                    tx.execute(
                        "INSERT INTO billing_options (id, question_id, option_text, position)
                         VALUES (?1, ?2, ?3, ?4)",
                        params![o.id, o.question_id, o.option_text, o.position],
                    )?;
                }

                tx.commit()?;
                Ok(())
            },
        }
    }

    pub async fn get_answers(
        pool: &DatabasePool,
        appointment_id: &str,
        form_id: &str,
    ) -> Result<Vec<BillingAnswerRecord>, RepositoryError> {
        match pool {
            DatabasePool::SQLite(pool) => {
                let conn = pool.get()?;
                let mut stmt = conn.prepare(
                    "SELECT id, appointment_id, billing_form_id, question_id, option_id, answer_text, created_at
                     FROM billing_answers
                     WHERE appointment_id = ?1 AND billing_form_id = ?2
                     ORDER BY rowid ASC",
                )?;

                let answers = stmt
                    .query_map(params![appointment_id, form_id], |row| {
                        Ok(BillingAnswerRecord {
                            id: row.get(0)?,
                            appointment_id: row.get(1)?,
                            billing_form_id: row.get(2)?,
                            question_id: row.get(3)?,
                            option_id: row.get(4)?,
                            answer_text: row.get(5)?,
                            created_at: parse_timestamp(6, row.get::<_, String>(6)?)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                Ok(answers)
            },
        }
    }

    /// Delete prior answers for the pair, then insert the new rows
    pub async fn replace_answers(
        pool: &DatabasePool,
        appointment_id: &str,
        form_id: &str,
        rows: &[BillingAnswerRecord],
    ) -> Result<usize, RepositoryError> {
        debug!("Replacing billing answers for appointment={} form={} ({} rows)",
            appointment_id, form_id, rows.len());

        match pool {
            DatabasePool::SQLite(pool) => {
                let mut conn = pool.get()?;
                let tx = conn.transaction()?;

                let deleted = tx.execute(
                    "DELETE FROM billing_answers WHERE appointment_id = ?1 AND billing_form_id = ?2",
                    params![appointment_id, form_id],
                )?;
                debug!("Deleted {} previous answer rows", deleted);

                insert_answers(&tx, rows)?;
                tx.commit()?;
                Ok(rows.len())
            },
        }
    }
}

fn insert_answers(conn: &Connection, rows: &[BillingAnswerRecord]) -> Result<(), RepositoryError> {
    let mut stmt = conn.prepare(
        "INSERT INTO billing_answers
            (id, appointment_id, billing_form_id, question_id, option_id, answer_text, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;

    for row in rows {
        stmt.execute(params![
            row.id,
            row.appointment_id,
            row.billing_form_id,
            row.question_id,
            row.option_id,
            row.answer_text,
            row.created_at.to_rfc3339(),
        ])?;
    }

    Ok(())
}

fn parse_timestamp(idx: usize, raw: String) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

/// `^[A-Za-z_][A-Za-z0-9_]*$`
pub(crate) fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {},
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Arc;
    use serde_json::json;
    use crate::database::migrations::run_sqlite_migrations;

    /// Migrated single-connection in-memory pool
    pub(crate) fn memory_pool() -> DatabasePool {
        let manager = r2d2_sqlite::SqliteConnectionManager::memory();
        let pool = r2d2::Pool::builder().max_size(1).build(manager).unwrap();
        run_sqlite_migrations(&pool.get().unwrap()).unwrap();
        DatabasePool::SQLite(Arc::new(pool))
    }

    #[test]
    fn test_is_sql_identifier() {
        assert!(is_sql_identifier("appointments"));
        assert!(is_sql_identifier("_x1"));
        assert!(!is_sql_identifier("1abc"));
        assert!(!is_sql_identifier("patients; DROP TABLE patients"));
        assert!(!is_sql_identifier(""));
    }

    #[tokio::test]
    async fn test_upsert_and_fetch_row() {
        let pool = memory_pool();
        let row = json!({"id": "p-1", "first_name": "Erika", "last_name": "Muster"})
            .as_object()
            .cloned()
            .unwrap();

        DatabaseStorage::upsert_row(&pool, "patients", &row).await.unwrap();
        let fetched = DatabaseStorage::fetch_row(&pool, "patients", "p-1").await.unwrap().unwrap();

        assert_eq!(fetched["first_name"], "Erika");
        assert_eq!(fetched["birth_date"], serde_json::Value::Null);
        assert!(fetched.contains_key("created_at"));
        assert!(DatabaseStorage::fetch_row(&pool, "patients", "p-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_rejects_bad_column() {
        let pool = memory_pool();
        let row = json!({"id": "p-1", "first_name) VALUES ('x'); --": "x"})
            .as_object()
            .cloned()
            .unwrap();

        assert!(matches!(
            DatabaseStorage::upsert_row(&pool, "patients", &row).await,
            Err(RepositoryError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_form_round_trip_and_answer_replacement() {
        let pool = memory_pool();
        let form = BillingFormRecord {
            id: "f1".to_string(),
            examination_id: Some("e1".to_string()),
            name: "MRT Knie".to_string(),
            created_at: Utc::now(),
        };
        let questions = vec![BillingQuestionRecord {
            id: "q1".to_string(),
            billing_form_id: "f1".to_string(),
            question_text: "Kontrastmittel?".to_string(),
            question_type: "yes_no".to_string(),
            required: true,
            position: 1,
            depends_on_question_id: None,
            depends_on_option_id: None,
        }];
        let options = vec![
            BillingOptionRecord { id: "o1".to_string(), question_id: "q1".to_string(), option_text: "Ja".to_string(), position: 1 },
            BillingOptionRecord { id: "o2".to_string(), question_id: "q1".to_string(), option_text: "Nein".to_string(), position: 2 },
        ];

        DatabaseStorage::save_form(&pool, &form, &questions, &options).await.unwrap();
        assert_eq!(DatabaseStorage::get_form(&pool, "f1").await.unwrap().unwrap().name, "MRT Knie");
        assert_eq!(DatabaseStorage::get_questions(&pool, "f1").await.unwrap(), questions);
        assert_eq!(DatabaseStorage::get_options(&pool, "f1").await.unwrap().len(), 2);

        let answer = |id: &str, option: &str| BillingAnswerRecord {
            id: id.to_string(),
            appointment_id: "a1".to_string(),
            billing_form_id: "f1".to_string(),
            question_id: "q1".to_string(),
            option_id: Some(option.to_string()),
            answer_text: None,
            created_at: Utc::now(),
        };

        DatabaseStorage::replace_answers(&pool, "a1", "f1", &[answer("r1", "o1")]).await.unwrap();
        DatabaseStorage::replace_answers(&pool, "a1", "f1", &[answer("r2", "o2")]).await.unwrap();

        let stored = DatabaseStorage::get_answers(&pool, "a1", "f1").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].option_id.as_deref(), Some("o2"));
    }

    #[tokio::test]
    async fn test_answers_come_back_in_insertion_order() {
        let pool = memory_pool();
        let now = Utc::now();
        let answer = |id: &str, option: &str| BillingAnswerRecord {
            id: id.to_string(),
            appointment_id: "a1".to_string(),
            billing_form_id: "f1".to_string(),
            question_id: "q3".to_string(),
            option_id: Some(option.to_string()),
            answer_text: None,
            created_at: now,
        };

        let rows = [answer("r-c", "o3"), answer("r-a", "o1"), answer("r-b", "o2")];
        DatabaseStorage::replace_answers(&pool, "a1", "f1", &rows).await.unwrap();

        let stored: Vec<String> = DatabaseStorage::get_answers(&pool, "a1", "f1")
            .await
            .unwrap()
            .into_iter()
            .filter_map(|a| a.option_id)
            .collect();
        assert_eq!(stored, vec!["o3", "o1", "o2"]);
    }

    #[test]
    fn test_explicit_pool_is_preferred() {
        let pool = memory_pool();
        assert!(matches!(resolve_backend(Some(&pool)), Ok(Backend::Database(_))));
    }
}
