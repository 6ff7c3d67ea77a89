use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::models::{BillingAnswerRecord, BillingFormRecord, BillingOptionRecord, BillingQuestionRecord, Row};
use super::errors::RepositoryError;

#[derive(Debug, Default)]
struct State {
    /// Generic rows keyed by table name, then by primary key
    tables: HashMap<String, HashMap<String, Row>>,
    forms: HashMap<String, BillingFormRecord>,
    /// Questions keyed by form id
    questions: HashMap<String, Vec<BillingQuestionRecord>>,
    /// Options keyed by form id
    options: HashMap<String, Vec<BillingOptionRecord>>,
    answers: Vec<BillingAnswerRecord>,
}

/// In-memory storage used when the database is not available
///
/// Clones share the same underlying state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    state: Arc<Mutex<State>>,
}

impl InMemoryStorage {
    /// Create a new in-memory storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a row by primary key
    pub async fn fetch_row(&self, table: &str, id: &str) -> Result<Option<Row>, RepositoryError> {
        let state = self.state.lock()?;
        Ok(state.tables.get(table).and_then(|rows| rows.get(id)).cloned())
    }

    /// Insert or replace a row; the row must carry a string `id`
    pub async fn upsert_row(&self, table: &str, row: Row) -> Result<(), RepositoryError> {
        let id = row_id(&row)?;
        let mut state = self.state.lock()?;
        state.tables.entry(table.to_string()).or_default().insert(id, row);
        Ok(())
    }

    pub async fn get_form(&self, form_id: &str) -> Result<Option<BillingFormRecord>, RepositoryError> {
        let state = self.state.lock()?;
        Ok(state.forms.get(form_id).cloned())
    }

    pub async fn get_questions(&self, form_id: &str) -> Result<Vec<BillingQuestionRecord>, RepositoryError> {
        let state = self.state.lock()?;
        let mut questions = state.questions.get(form_id).cloned().unwrap_or_default();
        questions.sort_by_key(|q| q.position);
        Ok(questions)
    }

    pub async fn get_options(&self, form_id: &str) -> Result<Vec<BillingOptionRecord>, RepositoryError> {
        let state = self.state.lock()?;
        let mut options = state.options.get(form_id).cloned().unwrap_or_default();
        options.sort_by(|a, b| a.question_id.cmp(&b.question_id).then(a.position.cmp(&b.position)));
        Ok(options)
    }

    /// Store a form definition, replacing any previous questions and options
    pub async fn save_form(
        &self,
        form: &BillingFormRecord,
        questions: &[BillingQuestionRecord],
        options: &[BillingOptionRecord],
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock()?;
        state.forms.insert(form.id.clone(), form.clone());
        state.questions.insert(form.id.clone(), questions.to_vec());
        state.options.insert(form.id.clone(), options.to_vec());
        Ok(())
    }

    pub async fn get_answers(
        &self,
        appointment_id: &str,
        form_id: &str,
    ) -> Result<Vec<BillingAnswerRecord>, RepositoryError> {
        let state = self.state.lock()?;
        Ok(state
            .answers
            .iter()
            .filter(|a| a.appointment_id == appointment_id && a.billing_form_id == form_id)
            .cloned()
            .collect())
    }

    /// Delete prior answers for the appointment/form pair, then insert `rows`
    pub async fn replace_answers(
        &self,
        appointment_id: &str,
        form_id: &str,
        rows: &[BillingAnswerRecord],
    ) -> Result<usize, RepositoryError> {
        let mut state = self.state.lock()?;
        state
            .answers
            .retain(|a| !(a.appointment_id == appointment_id && a.billing_form_id == form_id));
        state.answers.extend(rows.iter().cloned());
        Ok(rows.len())
    }
}

/// Extract the primary key of a generic row
pub(crate) fn row_id(row: &Row) -> Result<String, RepositoryError> {
    match row.get("id") {
        Some(serde_json::Value::String(id)) if !id.is_empty() => Ok(id.clone()),
        Some(serde_json::Value::Number(n)) => Ok(n.to_string()),
        _ => Err(RepositoryError::Validation("row is missing a valid id".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn answer(appointment: &str, form: &str, question: &str) -> BillingAnswerRecord {
        BillingAnswerRecord {
            id: format!("{}-{}-{}", appointment, form, question),
            appointment_id: appointment.to_string(),
            billing_form_id: form.to_string(),
            question_id: question.to_string(),
            option_id: None,
            answer_text: Some("x".to_string()),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_rows_are_shared_between_clones() {
        let storage = InMemoryStorage::new();
        let clone = storage.clone();

        let row = json!({"id": "apt-1", "status": "booked"}).as_object().cloned().unwrap();
        storage.upsert_row("appointments", row).await.unwrap();

        let fetched = clone.fetch_row("appointments", "apt-1").await.unwrap().unwrap();
        assert_eq!(fetched["status"], "booked");
        assert!(clone.fetch_row("patients", "apt-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_requires_id() {
        let storage = InMemoryStorage::new();
        let row = json!({"status": "booked"}).as_object().cloned().unwrap();
        assert!(matches!(
            storage.upsert_row("appointments", row).await,
            Err(RepositoryError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_replace_answers_only_touches_one_pair() {
        let storage = InMemoryStorage::new();
        storage
            .replace_answers("a1", "f1", &[answer("a1", "f1", "q1"), answer("a1", "f1", "q2")])
            .await
            .unwrap();
        storage.replace_answers("a2", "f1", &[answer("a2", "f1", "q1")]).await.unwrap();

        let written = storage.replace_answers("a1", "f1", &[answer("a1", "f1", "q3")]).await.unwrap();
        assert_eq!(written, 1);

        let a1 = storage.get_answers("a1", "f1").await.unwrap();
        assert_eq!(a1.len(), 1);
        assert_eq!(a1[0].question_id, "q3");
        assert_eq!(storage.get_answers("a2", "f1").await.unwrap().len(), 1);
    }
}
