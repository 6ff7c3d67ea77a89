use uuid::Uuid;

use radiology_data::models::{BillingAnswerRecord, BillingFormRecord, BillingOptionRecord, BillingQuestionRecord};
use crate::entities::billing::{
    BillingAnswerRow, BillingForm, BillingOption, BillingQuestion, QuestionDependency, QuestionType,
};

// Conversion functions between domain entities and data models
// These follow the pattern convert_to_[target_layer]_[model_name]

/// Helper function to safely parse a string ID to UUID
pub fn parse_string_to_uuid(id: &str) -> Result<Uuid, String> {
    Uuid::parse_str(id).map_err(|_| format!("Invalid UUID format: {}", id))
}

/// Convert a stored question to a domain question
pub fn convert_to_domain_question(record: BillingQuestionRecord) -> Result<BillingQuestion, String> {
    let question_type = QuestionType::parse(&record.question_type)
        .ok_or_else(|| format!("Unknown question type '{}' on question {}", record.question_type, record.id))?;

    let depends_on = match (record.depends_on_question_id.as_deref(), record.depends_on_option_id.as_deref()) {
        (None, None) => None,
        (Some(question_id), Some(option_id)) => Some(QuestionDependency {
            question_id: parse_string_to_uuid(question_id)?,
            option_id: parse_string_to_uuid(option_id)?,
        }),
        _ => {
            return Err(format!(
                "Question {} declares a dependency without both a question and an option",
                record.id
            ))
        }
    };

    Ok(BillingQuestion {
        id: parse_string_to_uuid(&record.id)?,
        form_id: parse_string_to_uuid(&record.billing_form_id)?,
        text: record.question_text,
        question_type,
        required: record.required,
        position: record.position,
        depends_on,
    })
}

/// Convert a domain question to a stored question
pub fn convert_to_data_question(question: &BillingQuestion) -> BillingQuestionRecord {
    BillingQuestionRecord {
        id: question.id.to_string(),
        billing_form_id: question.form_id.to_string(),
        question_text: question.text.clone(),
        question_type: question.question_type.as_str().to_string(),
        required: question.required,
        position: question.position,
        depends_on_question_id: question.depends_on.map(|d| d.question_id.to_string()),
        depends_on_option_id: question.depends_on.map(|d| d.option_id.to_string()),
    }
}

/// Convert a stored option to a domain option
pub fn convert_to_domain_option(record: BillingOptionRecord) -> Result<BillingOption, String> {
    Ok(BillingOption {
        id: parse_string_to_uuid(&record.id)?,
        question_id: parse_string_to_uuid(&record.question_id)?,
        label: record.option_text,
        position: record.position,
    })
}

/// Convert a domain option to a stored option
pub fn convert_to_data_option(option: &BillingOption) -> BillingOptionRecord {
    BillingOptionRecord {
        id: option.id.to_string(),
        question_id: option.question_id.to_string(),
        option_text: option.label.clone(),
        position: option.position,
    }
}

/// Assemble a domain form from its stored parts
pub fn convert_to_domain_form(
    record: BillingFormRecord,
    questions: Vec<BillingQuestionRecord>,
    options: Vec<BillingOptionRecord>,
) -> Result<BillingForm, String> {
    Ok(BillingForm {
        id: parse_string_to_uuid(&record.id)?,
        examination_id: record.examination_id,
        name: record.name,
        created_at: record.created_at,
        questions: questions
            .into_iter()
            .map(convert_to_domain_question)
            .collect::<Result<Vec<_>, _>>()?,
        options: options
            .into_iter()
            .map(convert_to_domain_option)
            .collect::<Result<Vec<_>, _>>()?,
    })
}

/// Convert a domain form header to a stored form
pub fn convert_to_data_form(form: &BillingForm) -> BillingFormRecord {
    BillingFormRecord {
        id: form.id.to_string(),
        examination_id: form.examination_id.clone(),
        name: form.name.clone(),
        created_at: form.created_at,
    }
}

/// Convert a stored answer to a domain answer row
pub fn convert_to_domain_answer(record: BillingAnswerRecord) -> Result<BillingAnswerRow, String> {
    Ok(BillingAnswerRow {
        id: parse_string_to_uuid(&record.id)?,
        appointment_id: record.appointment_id,
        form_id: parse_string_to_uuid(&record.billing_form_id)?,
        question_id: parse_string_to_uuid(&record.question_id)?,
        option_id: record.option_id.as_deref().map(parse_string_to_uuid).transpose()?,
        answer_text: record.answer_text,
        created_at: record.created_at,
    })
}

/// Convert a domain answer row to a stored answer
pub fn convert_to_data_answer(row: &BillingAnswerRow) -> BillingAnswerRecord {
    BillingAnswerRecord {
        id: row.id.to_string(),
        appointment_id: row.appointment_id.clone(),
        billing_form_id: row.form_id.to_string(),
        question_id: row.question_id.to_string(),
        option_id: row.option_id.map(|id| id.to_string()),
        answer_text: row.answer_text.clone(),
        created_at: row.created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question_record() -> BillingQuestionRecord {
        BillingQuestionRecord {
            id: Uuid::new_v4().to_string(),
            billing_form_id: Uuid::new_v4().to_string(),
            question_text: "Kontrastmittel?".to_string(),
            question_type: "yes-no".to_string(),
            required: true,
            position: 3,
            depends_on_question_id: None,
            depends_on_option_id: None,
        }
    }

    #[test]
    fn test_question_round_trip_normalizes_type_tag() {
        let record = question_record();
        let question = convert_to_domain_question(record.clone()).unwrap();
        assert_eq!(question.question_type, QuestionType::YesNo);

        let back = convert_to_data_question(&question);
        assert_eq!(back.question_type, "yes_no");
        assert_eq!(back.id, record.id);
    }

    #[test]
    fn test_half_declared_dependency_is_rejected() {
        let record = BillingQuestionRecord {
            depends_on_question_id: Some(Uuid::new_v4().to_string()),
            ..question_record()
        };
        assert!(convert_to_domain_question(record).is_err());
    }

    #[test]
    fn test_invalid_uuid_is_rejected() {
        let record = BillingQuestionRecord {
            id: "not-a-uuid".to_string(),
            ..question_record()
        };
        let err = convert_to_domain_question(record).unwrap_err();
        assert!(err.contains("Invalid UUID format"));
    }
}
