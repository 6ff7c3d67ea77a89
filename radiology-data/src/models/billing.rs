use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

/// Data model for a billing form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingFormRecord {
    /// Unique identifier for the form
    pub id: String,
    /// Examination the form belongs to
    pub examination_id: Option<String>,
    /// Display name
    pub name: String,
    /// When the form was created
    pub created_at: DateTime<Utc>,
}

/// Data model for a billing question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingQuestionRecord {
    pub id: String,
    pub billing_form_id: String,
    pub question_text: String,
    /// Stored type tag, e.g. `yes_no` or `multiple_choice`
    pub question_type: String,
    pub required: bool,
    pub position: i64,
    pub depends_on_question_id: Option<String>,
    pub depends_on_option_id: Option<String>,
}

/// Data model for a selectable option of a billing question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingOptionRecord {
    pub id: String,
    pub question_id: String,
    pub option_text: String,
    pub position: i64,
}

/// Data model for one persisted answer row
///
/// Multi-valued answers are stored as one row per selected option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingAnswerRecord {
    pub id: String,
    pub appointment_id: String,
    pub billing_form_id: String,
    pub question_id: String,
    pub option_id: Option<String>,
    pub answer_text: Option<String>,
    pub created_at: DateTime<Utc>,
}
