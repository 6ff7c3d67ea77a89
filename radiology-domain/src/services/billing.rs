use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use radiology_data::repository::{BillingRepository, BillingRepositoryTrait, RepositoryError};

use crate::auth::logging::log_billing_submission;
use crate::entities::billing::{AnswerValue, BillingForm};
use crate::entities::conversions;
use crate::services::answer_sheet::{AnswerError, AnswerSheet, Propagation};
use crate::services::dependency_graph::{DependencyGraph, GraphError};

/// Billing service errors
#[derive(Debug, Error)]
pub enum BillingServiceError {
    /// Form or answers not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Appointment id is blank
    #[error("Invalid appointment id: {0}")]
    InvalidAppointment(String),

    /// Stored or submitted form definition is inconsistent
    #[error("Invalid billing form: {0}")]
    InvalidForm(String),

    /// Answer change rejected
    #[error(transparent)]
    Answer(#[from] AnswerError),

    /// Submission is incomplete
    #[error("{} required questions unanswered, {} invalid numbers", .missing_required.len(), .invalid_numbers.len())]
    Validation {
        missing_required: Vec<Uuid>,
        invalid_numbers: Vec<Uuid>,
    },

    /// Repository error
    #[error("Repository error: {0}")]
    Repository(String),
}

impl From<GraphError> for BillingServiceError {
    fn from(err: GraphError) -> Self {
        BillingServiceError::InvalidForm(err.to_string())
    }
}

/// One change applied to a sheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AnswerChange {
    /// Replace the answer of a question
    Set { question_id: Uuid, value: AnswerValue },
    /// Select or deselect an option of a multi-valued question
    Toggle { question_id: Uuid, option_id: Uuid },
}

/// State of a sheet as presented to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetSnapshot {
    pub form_id: Uuid,
    /// Answers of visible questions
    pub answers: BTreeMap<Uuid, AnswerValue>,
    /// Visible questions in form order
    pub visible_questions: Vec<Uuid>,
    pub missing_required: Vec<Uuid>,
    pub invalid_numbers: Vec<Uuid>,
}

impl SheetSnapshot {
    /// Capture the current state of a sheet
    pub fn capture(form_id: Uuid, sheet: &AnswerSheet) -> Self {
        Self {
            form_id,
            answers: sheet.answers().iter().map(|(k, v)| (*k, v.clone())).collect(),
            visible_questions: sheet.visible_questions().iter().map(|q| q.id).collect(),
            missing_required: sheet.missing_required(),
            invalid_numbers: sheet.invalid_numbers(),
        }
    }
}

/// Result of applying one change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub snapshot: SheetSnapshot,
    pub propagation: Propagation,
}

/// Outcome of a submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub appointment_id: String,
    pub form_id: Uuid,
    pub rows_written: usize,
    pub submitted_at: DateTime<Utc>,
}

/// Trait for billing questionnaire operations
#[async_trait]
pub trait BillingServiceTrait {
    /// Get a form definition with questions and options
    async fn get_form(&self, form_id: Uuid) -> Result<BillingForm, BillingServiceError>;

    /// Store a form definition after checking its dependency graph
    async fn save_form(&self, form: BillingForm) -> Result<BillingForm, BillingServiceError>;

    /// Current sheet of an appointment, rebuilt from stored answers
    async fn load_sheet(&self, appointment_id: &str, form_id: Uuid) -> Result<SheetSnapshot, BillingServiceError>;

    /// Apply one change to a set of working answers
    async fn evaluate_change(
        &self,
        form_id: Uuid,
        answers: HashMap<Uuid, AnswerValue>,
        change: AnswerChange,
    ) -> Result<Evaluation, BillingServiceError>;

    /// Validate answers and replace the stored answers of an appointment
    async fn submit(
        &self,
        appointment_id: &str,
        form_id: Uuid,
        answers: HashMap<Uuid, AnswerValue>,
    ) -> Result<SubmissionReceipt, BillingServiceError>;
}

/// Billing service for domain logic
pub struct BillingService<R: BillingRepositoryTrait> {
    repository: R,
}

impl<R: BillingRepositoryTrait + Send + Sync> BillingService<R> {
    /// Create a new billing service
    pub fn new(repository: R) -> Self {
        Self { repository }
    }

    /// Map repository errors to service errors
    fn map_repo_error(&self, err: RepositoryError) -> BillingServiceError {
        match err {
            RepositoryError::NotFound(msg) => BillingServiceError::NotFound(msg),
            RepositoryError::Validation(msg) => BillingServiceError::InvalidForm(msg),
            _ => BillingServiceError::Repository(err.to_string()),
        }
    }

    async fn load_form(&self, form_id: Uuid) -> Result<(BillingForm, DependencyGraph), BillingServiceError> {
        let id = form_id.to_string();
        let record = self
            .repository
            .get_form(&id)
            .await
            .map_err(|e| self.map_repo_error(e))?
            .ok_or_else(|| BillingServiceError::NotFound(format!("Billing form {} not found", form_id)))?;

        let questions = self.repository.get_questions(&id).await.map_err(|e| self.map_repo_error(e))?;
        let options = self.repository.get_options(&id).await.map_err(|e| self.map_repo_error(e))?;

        let form = conversions::convert_to_domain_form(record, questions, options).map_err(|e| {
            error!("Stored billing form {} cannot be decoded: {}", form_id, e);
            BillingServiceError::InvalidForm(e)
        })?;
        let graph = DependencyGraph::build(form.questions.clone(), form.options.clone())?;
        Ok((form, graph))
    }
}

#[async_trait]
impl<R: BillingRepositoryTrait + Send + Sync> BillingServiceTrait for BillingService<R> {
    #[instrument(skip(self))]
    async fn get_form(&self, form_id: Uuid) -> Result<BillingForm, BillingServiceError> {
        let (form, _) = self.load_form(form_id).await?;
        Ok(form)
    }

    #[instrument(skip(self, form), fields(form_id = %form.id))]
    async fn save_form(&self, form: BillingForm) -> Result<BillingForm, BillingServiceError> {
        if form.name.trim().is_empty() {
            return Err(BillingServiceError::InvalidForm("Form name must not be empty".to_string()));
        }
        if let Some(q) = form.questions.iter().find(|q| q.form_id != form.id) {
            return Err(BillingServiceError::InvalidForm(format!(
                "Question {} belongs to form {}",
                q.id, q.form_id
            )));
        }
        DependencyGraph::build(form.questions.clone(), form.options.clone())?;

        let record = conversions::convert_to_data_form(&form);
        let questions = form.questions.iter().map(conversions::convert_to_data_question).collect();
        let options = form.options.iter().map(conversions::convert_to_data_option).collect();

        self.repository
            .save_form(record, questions, options)
            .await
            .map_err(|e| self.map_repo_error(e))?;

        info!("Saved billing form {} with {} questions", form.id, form.questions.len());
        Ok(form)
    }

    #[instrument(skip(self))]
    async fn load_sheet(&self, appointment_id: &str, form_id: Uuid) -> Result<SheetSnapshot, BillingServiceError> {
        let (_, graph) = self.load_form(form_id).await?;

        let records = self
            .repository
            .get_answers(appointment_id, &form_id.to_string())
            .await
            .map_err(|e| self.map_repo_error(e))?;

        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            match conversions::convert_to_domain_answer(record) {
                Ok(row) => rows.push(row),
                Err(e) => warn!("Skipping undecodable answer row: {}", e),
            }
        }

        let sheet = AnswerSheet::from_rows(graph, &rows);
        Ok(SheetSnapshot::capture(form_id, &sheet))
    }

    #[instrument(skip(self, answers))]
    async fn evaluate_change(
        &self,
        form_id: Uuid,
        answers: HashMap<Uuid, AnswerValue>,
        change: AnswerChange,
    ) -> Result<Evaluation, BillingServiceError> {
        let (_, graph) = self.load_form(form_id).await?;
        let mut sheet = AnswerSheet::from_answers(graph, &answers)?;

        let propagation = match change {
            AnswerChange::Set { question_id, value } => sheet.set_answer(question_id, value)?,
            AnswerChange::Toggle { question_id, option_id } => sheet.toggle_option(question_id, option_id)?,
        };

        Ok(Evaluation {
            snapshot: SheetSnapshot::capture(form_id, &sheet),
            propagation,
        })
    }

    #[instrument(skip(self, answers))]
    async fn submit(
        &self,
        appointment_id: &str,
        form_id: Uuid,
        answers: HashMap<Uuid, AnswerValue>,
    ) -> Result<SubmissionReceipt, BillingServiceError> {
        if appointment_id.trim().is_empty() {
            return Err(BillingServiceError::InvalidAppointment("must not be empty".to_string()));
        }

        let (_, graph) = self.load_form(form_id).await?;
        let sheet = AnswerSheet::from_answers(graph, &answers)?;

        let missing_required = sheet.missing_required();
        let invalid_numbers = sheet.invalid_numbers();
        if !missing_required.is_empty() || !invalid_numbers.is_empty() {
            return Err(BillingServiceError::Validation {
                missing_required,
                invalid_numbers,
            });
        }

        let now = Utc::now();
        let rows = sheet
            .submission_rows(appointment_id, form_id, now)
            .iter()
            .map(conversions::convert_to_data_answer)
            .collect();

        let rows_written = self
            .repository
            .replace_answers(appointment_id, &form_id.to_string(), rows)
            .await
            .map_err(|e| self.map_repo_error(e))?;

        log_billing_submission(appointment_id, &form_id.to_string(), rows_written);

        Ok(SubmissionReceipt {
            appointment_id: appointment_id.to_string(),
            form_id,
            rows_written,
            submitted_at: now,
        })
    }
}

/// Type alias for the shared billing service
pub type BillingServiceRef = Arc<dyn BillingServiceTrait + Send + Sync>;

/// Create a billing service over the default repository
pub fn create_default_billing_service() -> BillingServiceRef {
    Arc::new(BillingService::new(BillingRepository::new()))
}
