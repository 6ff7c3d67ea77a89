use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use radiology_domain::entities::billing::AnswerValue;
use radiology_domain::services::{AnswerChange, Evaluation, SheetSnapshot, SubmissionReceipt};

/// Working answers plus one change to apply
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EvaluateRequest {
    /// Current answers keyed by question id, e.g.
    /// `{"<question id>": {"kind": "choice", "value": "<option id>"}}`
    #[serde(default)]
    #[schema(value_type = Object)]
    pub answers: HashMap<Uuid, AnswerValue>,

    /// `{"action": "set", "question_id": ..., "value": {...}}` or
    /// `{"action": "toggle", "question_id": ..., "option_id": ...}`
    #[schema(value_type = Object)]
    pub change: AnswerChange,
}

/// Answers to submit for an appointment
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubmitAnswersRequest {
    /// Answers keyed by question id
    #[schema(value_type = Object)]
    pub answers: HashMap<Uuid, AnswerValue>,
}

/// Answers and visibility of a billing form
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SheetResponse {
    pub form_id: Uuid,
    /// Answers of visible questions keyed by question id
    #[schema(value_type = Object)]
    pub answers: BTreeMap<Uuid, AnswerValue>,
    /// Visible questions in form order
    pub visible_questions: Vec<Uuid>,
    /// Visible required questions without an answer
    pub missing_required: Vec<Uuid>,
    /// Visible number questions whose text is not a number
    pub invalid_numbers: Vec<Uuid>,
}

impl From<SheetSnapshot> for SheetResponse {
    fn from(snapshot: SheetSnapshot) -> Self {
        Self {
            form_id: snapshot.form_id,
            answers: snapshot.answers,
            visible_questions: snapshot.visible_questions,
            missing_required: snapshot.missing_required,
            invalid_numbers: snapshot.invalid_numbers,
        }
    }
}

/// Sheet after one change, with the questions it showed and hid
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EvaluationResponse {
    pub sheet: SheetResponse,
    pub shown: Vec<Uuid>,
    pub hidden: Vec<Uuid>,
}

impl From<Evaluation> for EvaluationResponse {
    fn from(evaluation: Evaluation) -> Self {
        Self {
            sheet: evaluation.snapshot.into(),
            shown: evaluation.propagation.shown,
            hidden: evaluation.propagation.hidden,
        }
    }
}

/// Result of a submission
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubmissionResponse {
    pub appointment_id: String,
    pub form_id: Uuid,
    /// Number of answer rows now stored
    pub rows_written: usize,
    pub submitted_at: DateTime<Utc>,
}

impl From<SubmissionReceipt> for SubmissionResponse {
    fn from(receipt: SubmissionReceipt) -> Self {
        Self {
            appointment_id: receipt.appointment_id,
            form_id: receipt.form_id,
            rows_written: receipt.rows_written,
            submitted_at: receipt.submitted_at,
        }
    }
}
