use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[cfg(feature = "with-api")]
use utoipa::ToSchema;

/// Kind of input a billing question asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    /// Two options, usually "Ja" / "Nein"
    YesNo,
    /// Exactly one option out of many
    SingleChoice,
    /// Any number of options
    MultipleChoice,
    /// Free text
    Text,
    /// Numeric value entered as text
    Number,
    /// Any number of options rendered as a bullet list
    BulletPoints,
}

impl QuestionType {
    /// Parse a stored type tag. Accepts `snake_case`, `kebab-case` and
    /// unseparated spellings.
    pub fn parse(s: &str) -> Option<Self> {
        let normalized: String = s
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| *c != '_' && *c != '-' && *c != ' ')
            .collect();

        match normalized.as_str() {
            "yesno" => Some(QuestionType::YesNo),
            "singlechoice" => Some(QuestionType::SingleChoice),
            "multiplechoice" => Some(QuestionType::MultipleChoice),
            "text" => Some(QuestionType::Text),
            "number" => Some(QuestionType::Number),
            "bulletpoints" => Some(QuestionType::BulletPoints),
            _ => None,
        }
    }

    /// Stored type tag
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::YesNo => "yes_no",
            QuestionType::SingleChoice => "single_choice",
            QuestionType::MultipleChoice => "multiple_choice",
            QuestionType::Text => "text",
            QuestionType::Number => "number",
            QuestionType::BulletPoints => "bullet_points",
        }
    }

    /// Whether an answer may select several options
    pub fn is_multi_valued(&self) -> bool {
        matches!(self, QuestionType::MultipleChoice | QuestionType::BulletPoints)
    }

    /// Whether answers are option selections rather than text
    pub fn is_choice(&self) -> bool {
        !matches!(self, QuestionType::Text | QuestionType::Number)
    }

    /// The answer a question starts with when it becomes visible
    pub fn empty_answer(&self) -> AnswerValue {
        match self {
            QuestionType::YesNo | QuestionType::SingleChoice => AnswerValue::Empty,
            QuestionType::MultipleChoice | QuestionType::BulletPoints => AnswerValue::Choices(Vec::new()),
            QuestionType::Text | QuestionType::Number => AnswerValue::Text(String::new()),
        }
    }
}

impl std::fmt::Display for QuestionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The current answer to one question
///
/// Serialized as `{"kind": "choice", "value": "<option id>"}` and so on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AnswerValue {
    /// No option selected yet
    Empty,
    /// One selected option
    Choice(Uuid),
    /// Selected options in selection order
    Choices(Vec<Uuid>),
    /// Free text, also used for numbers
    Text(String),
}

impl AnswerValue {
    /// Whether the answer counts as unanswered for required-field checks
    pub fn is_blank(&self) -> bool {
        match self {
            AnswerValue::Empty => true,
            AnswerValue::Choice(_) => false,
            AnswerValue::Choices(options) => options.is_empty(),
            AnswerValue::Text(text) => text.trim().is_empty(),
        }
    }

    /// Whether the answer equals or contains the option
    pub fn selects(&self, option_id: Uuid) -> bool {
        match self {
            AnswerValue::Choice(selected) => *selected == option_id,
            AnswerValue::Choices(selected) => selected.contains(&option_id),
            AnswerValue::Empty | AnswerValue::Text(_) => false,
        }
    }
}

/// A selectable option of a billing question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(ToSchema))]
pub struct BillingOption {
    pub id: Uuid,
    pub question_id: Uuid,
    /// Display label, e.g. "Ja"
    pub label: String,
    pub position: i64,
}

/// Edge from a dependent question to the answer that reveals it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(ToSchema))]
pub struct QuestionDependency {
    /// Question whose answer controls visibility
    pub question_id: Uuid,
    /// Option that must be selected on that question
    pub option_id: Uuid,
}

/// A question of a billing form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(ToSchema))]
pub struct BillingQuestion {
    pub id: Uuid,
    pub form_id: Uuid,
    /// Question text shown to staff
    pub text: String,
    pub question_type: QuestionType,
    /// Whether a visible question must be answered before submission
    pub required: bool,
    /// Sort order within the form
    pub position: i64,
    /// Present when the question is only shown for a specific answer
    pub depends_on: Option<QuestionDependency>,
}

/// A billing form with its questions and options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(ToSchema))]
pub struct BillingForm {
    pub id: Uuid,
    /// Examination the form derives billing codes for
    pub examination_id: Option<String>,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub questions: Vec<BillingQuestion>,
    pub options: Vec<BillingOption>,
}

/// One persisted answer row
///
/// Multi-valued answers produce one row per selected option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(ToSchema))]
pub struct BillingAnswerRow {
    pub id: Uuid,
    pub appointment_id: String,
    pub form_id: Uuid,
    pub question_id: Uuid,
    pub option_id: Option<Uuid>,
    pub answer_text: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_type_parse() {
        assert_eq!(QuestionType::parse("yes_no"), Some(QuestionType::YesNo));
        assert_eq!(QuestionType::parse("yes-no"), Some(QuestionType::YesNo));
        assert_eq!(QuestionType::parse("Multiple_Choice"), Some(QuestionType::MultipleChoice));
        assert_eq!(QuestionType::parse("bullet-points"), Some(QuestionType::BulletPoints));
        assert_eq!(QuestionType::parse("date"), None);
    }

    #[test]
    fn test_empty_answers_by_type() {
        assert_eq!(QuestionType::YesNo.empty_answer(), AnswerValue::Empty);
        assert_eq!(QuestionType::SingleChoice.empty_answer(), AnswerValue::Empty);
        assert_eq!(QuestionType::MultipleChoice.empty_answer(), AnswerValue::Choices(vec![]));
        assert_eq!(QuestionType::BulletPoints.empty_answer(), AnswerValue::Choices(vec![]));
        assert_eq!(QuestionType::Text.empty_answer(), AnswerValue::Text(String::new()));
        assert_eq!(QuestionType::Number.empty_answer(), AnswerValue::Text(String::new()));
    }

    #[test]
    fn test_answer_selects() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        assert!(AnswerValue::Choice(a).selects(a));
        assert!(!AnswerValue::Choice(a).selects(b));
        assert!(AnswerValue::Choices(vec![b, a]).selects(a));
        assert!(!AnswerValue::Empty.selects(a));
        assert!(!AnswerValue::Text(a.to_string()).selects(a));
    }

    #[test]
    fn test_answer_value_wire_format() {
        let id = Uuid::nil();
        let json = serde_json::to_value(AnswerValue::Choice(id)).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "choice", "value": id.to_string()}));

        let empty: AnswerValue = serde_json::from_value(serde_json::json!({"kind": "empty"})).unwrap();
        assert_eq!(empty, AnswerValue::Empty);
        assert!(AnswerValue::Text("  ".to_string()).is_blank());
    }
}
