//! Working answers of one billing form
//!
//! An `AnswerSheet` only ever holds answers for visible questions. Changing
//! an answer walks the dependents of the changed question: questions that
//! become visible start from a fresh empty answer and questions that become
//! hidden lose theirs, which in turn hides their own dependents.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::entities::billing::{AnswerValue, BillingAnswerRow, BillingQuestion, QuestionType};
use crate::services::dependency_graph::DependencyGraph;

/// Errors raised while changing answers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnswerError {
    /// Question is not part of the form
    #[error("Unknown question {0}")]
    UnknownQuestion(Uuid),

    /// Question is currently hidden and cannot be answered
    #[error("Question {0} is not visible")]
    HiddenQuestion(Uuid),

    /// Answer shape does not fit the question type
    #[error("Answer for question {question_id} does not fit type {question_type}")]
    TypeMismatch {
        question_id: Uuid,
        question_type: QuestionType,
    },

    /// Option does not belong to the question
    #[error("Option {option_id} does not belong to question {question_id}")]
    UnknownOption { question_id: Uuid, option_id: Uuid },

    /// Toggling options is only possible on multi-valued questions
    #[error("Question {0} does not accept several options")]
    NotMultiValued(Uuid),
}

/// Visibility changes caused by one answer change
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Propagation {
    /// Questions that became visible, with a fresh empty answer
    pub shown: Vec<Uuid>,
    /// Questions that became hidden and lost their answer
    pub hidden: Vec<Uuid>,
}

/// Answers of one billing form for one appointment
#[derive(Debug, Clone)]
pub struct AnswerSheet {
    graph: DependencyGraph,
    answers: HashMap<Uuid, AnswerValue>,
}

impl AnswerSheet {
    /// Start an empty sheet; every initially visible question gets its
    /// type's empty answer
    pub fn new(graph: DependencyGraph) -> Self {
        let mut sheet = Self {
            graph,
            answers: HashMap::new(),
        };

        for id in sheet.graph.topological_order() {
            if sheet.graph.is_visible(id, &sheet.answers) {
                if let Some(question) = sheet.graph.question(id) {
                    sheet.answers.insert(id, question.question_type.empty_answer());
                }
            }
        }
        sheet
    }

    /// Replay answers onto a fresh sheet, parents before dependents
    ///
    /// Answers for questions that end up hidden are dropped. Unknown
    /// questions and malformed answers are errors.
    pub fn from_answers(graph: DependencyGraph, answers: &HashMap<Uuid, AnswerValue>) -> Result<Self, AnswerError> {
        if let Some(unknown) = answers.keys().find(|id| graph.question(**id).is_none()) {
            return Err(AnswerError::UnknownQuestion(*unknown));
        }

        let order = graph.topological_order();
        let mut sheet = Self::new(graph);
        for id in order {
            let Some(value) = answers.get(&id) else { continue };
            if !sheet.is_visible(id) {
                debug!("Dropping answer for hidden question {}", id);
                continue;
            }
            sheet.set_answer(id, value.clone())?;
        }
        Ok(sheet)
    }

    /// Rebuild a sheet from persisted answer rows
    ///
    /// Rows that no longer match the form (unknown question or option) are
    /// skipped with a warning.
    pub fn from_rows(graph: DependencyGraph, rows: &[BillingAnswerRow]) -> Self {
        let mut answers: HashMap<Uuid, AnswerValue> = HashMap::new();

        for row in rows {
            let Some(question) = graph.question(row.question_id) else {
                warn!("Skipping stored answer {} for unknown question {}", row.id, row.question_id);
                continue;
            };

            if question.question_type.is_choice() {
                let Some(option_id) = row.option_id else {
                    warn!("Skipping stored answer {} without option for question {}", row.id, question.id);
                    continue;
                };
                if !graph.option_belongs(question.id, option_id) {
                    warn!("Skipping stored answer {} with foreign option {}", row.id, option_id);
                    continue;
                }

                if question.question_type.is_multi_valued() {
                    match answers.entry(question.id).or_insert_with(|| AnswerValue::Choices(Vec::new())) {
                        AnswerValue::Choices(selected) if !selected.contains(&option_id) => selected.push(option_id),
                        _ => {}
                    }
                } else {
                    answers.insert(question.id, AnswerValue::Choice(option_id));
                }
            } else if let Some(ref text) = row.answer_text {
                answers.insert(question.id, AnswerValue::Text(text.clone()));
            }
        }

        let order = graph.topological_order();
        let mut sheet = Self::new(graph);
        for id in order {
            let Some(value) = answers.remove(&id) else { continue };
            if !sheet.is_visible(id) {
                continue;
            }
            if let Err(e) = sheet.set_answer(id, value) {
                warn!("Skipping stored answer for question {}: {}", id, e);
            }
        }
        sheet
    }

    /// The dependency graph the sheet works on
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Current answer of a question; `None` for hidden questions
    pub fn answer(&self, question_id: Uuid) -> Option<&AnswerValue> {
        self.answers.get(&question_id)
    }

    /// All current answers
    pub fn answers(&self) -> &HashMap<Uuid, AnswerValue> {
        &self.answers
    }

    /// Whether a question is currently shown
    pub fn is_visible(&self, question_id: Uuid) -> bool {
        self.graph.is_visible(question_id, &self.answers)
    }

    /// Visible questions in form order
    pub fn visible_questions(&self) -> Vec<&BillingQuestion> {
        self.graph
            .questions()
            .iter()
            .filter(|q| self.is_visible(q.id))
            .collect()
    }

    /// Set the answer of a visible question and update its dependents
    pub fn set_answer(&mut self, question_id: Uuid, value: AnswerValue) -> Result<Propagation, AnswerError> {
        let question = self
            .graph
            .question(question_id)
            .ok_or(AnswerError::UnknownQuestion(question_id))?;

        if !self.is_visible(question_id) {
            return Err(AnswerError::HiddenQuestion(question_id));
        }

        let value = self.normalize(question, value)?;
        self.answers.insert(question_id, value);
        Ok(self.propagate(question_id))
    }

    /// Select or deselect one option of a multi-valued question
    pub fn toggle_option(&mut self, question_id: Uuid, option_id: Uuid) -> Result<Propagation, AnswerError> {
        let question = self
            .graph
            .question(question_id)
            .ok_or(AnswerError::UnknownQuestion(question_id))?;

        if !question.question_type.is_multi_valued() {
            return Err(AnswerError::NotMultiValued(question_id));
        }
        if !self.graph.option_belongs(question_id, option_id) {
            return Err(AnswerError::UnknownOption { question_id, option_id });
        }

        let mut selected = match self.answers.get(&question_id) {
            Some(AnswerValue::Choices(selected)) => selected.clone(),
            _ => Vec::new(),
        };
        if let Some(pos) = selected.iter().position(|id| *id == option_id) {
            selected.remove(pos);
        } else {
            selected.push(option_id);
        }

        self.set_answer(question_id, AnswerValue::Choices(selected))
    }

    /// Check an answer against the question type and bring it into the
    /// canonical shape for that type
    fn normalize(&self, question: &BillingQuestion, value: AnswerValue) -> Result<AnswerValue, AnswerError> {
        let mismatch = || AnswerError::TypeMismatch {
            question_id: question.id,
            question_type: question.question_type,
        };
        let check_option = |option_id: Uuid| {
            if self.graph.option_belongs(question.id, option_id) {
                Ok(())
            } else {
                Err(AnswerError::UnknownOption {
                    question_id: question.id,
                    option_id,
                })
            }
        };

        match question.question_type {
            QuestionType::YesNo | QuestionType::SingleChoice => match value {
                AnswerValue::Empty => Ok(AnswerValue::Empty),
                AnswerValue::Choice(option_id) => {
                    check_option(option_id)?;
                    Ok(AnswerValue::Choice(option_id))
                }
                _ => Err(mismatch()),
            },
            QuestionType::MultipleChoice | QuestionType::BulletPoints => match value {
                AnswerValue::Empty => Ok(AnswerValue::Choices(Vec::new())),
                AnswerValue::Choices(options) => {
                    let mut unique = Vec::with_capacity(options.len());
                    for option_id in options {
                        check_option(option_id)?;
                        if !unique.contains(&option_id) {
                            unique.push(option_id);
                        }
                    }
                    Ok(AnswerValue::Choices(unique))
                }
                _ => Err(mismatch()),
            },
            QuestionType::Text | QuestionType::Number => match value {
                AnswerValue::Empty => Ok(AnswerValue::Text(String::new())),
                AnswerValue::Text(text) => Ok(AnswerValue::Text(text)),
                _ => Err(mismatch()),
            },
        }
    }

    /// Recompute visibility of everything below `question_id`
    ///
    /// Descendants come parent first, so each question is judged against
    /// answers its parent already reflects.
    fn propagate(&mut self, question_id: Uuid) -> Propagation {
        let mut propagation = Propagation::default();

        for id in self.graph.descendants(question_id) {
            let visible = self.graph.is_visible(id, &self.answers);
            let answered = self.answers.contains_key(&id);

            if visible && !answered {
                if let Some(question) = self.graph.question(id) {
                    self.answers.insert(id, question.question_type.empty_answer());
                    propagation.shown.push(id);
                }
            } else if !visible && answered {
                self.answers.remove(&id);
                propagation.hidden.push(id);
            }
        }

        if !propagation.shown.is_empty() || !propagation.hidden.is_empty() {
            debug!(
                "Answer to {} showed {} and hid {} questions",
                question_id,
                propagation.shown.len(),
                propagation.hidden.len()
            );
        }
        propagation
    }

    /// Visible required questions that are still unanswered
    pub fn missing_required(&self) -> Vec<Uuid> {
        self.visible_questions()
            .into_iter()
            .filter(|q| q.required)
            .filter(|q| self.answers.get(&q.id).map_or(true, AnswerValue::is_blank))
            .map(|q| q.id)
            .collect()
    }

    /// Visible number questions whose text is not a number
    pub fn invalid_numbers(&self) -> Vec<Uuid> {
        self.visible_questions()
            .into_iter()
            .filter(|q| q.question_type == QuestionType::Number)
            .filter(|q| match self.answers.get(&q.id) {
                Some(AnswerValue::Text(text)) if !text.trim().is_empty() => parse_number(text).is_none(),
                _ => false,
            })
            .map(|q| q.id)
            .collect()
    }

    /// Rows to persist for this sheet
    ///
    /// One row per non-blank single-valued answer and one row per selected
    /// option of a multi-valued answer. Hidden questions hold no answer and
    /// therefore contribute nothing.
    pub fn submission_rows(&self, appointment_id: &str, form_id: Uuid, now: DateTime<Utc>) -> Vec<BillingAnswerRow> {
        let row = |question_id: Uuid, option_id: Option<Uuid>, answer_text: Option<String>| BillingAnswerRow {
            id: Uuid::new_v4(),
            appointment_id: appointment_id.to_string(),
            form_id,
            question_id,
            option_id,
            answer_text,
            created_at: now,
        };

        let mut rows = Vec::new();
        for question in self.visible_questions() {
            match self.answers.get(&question.id) {
                Some(AnswerValue::Choice(option_id)) => rows.push(row(question.id, Some(*option_id), None)),
                Some(AnswerValue::Choices(selected)) => {
                    rows.extend(selected.iter().map(|option_id| row(question.id, Some(*option_id), None)));
                }
                Some(AnswerValue::Text(text)) if !text.trim().is_empty() => {
                    rows.push(row(question.id, None, Some(text.trim().to_string())));
                }
                _ => {}
            }
        }
        rows
    }
}

/// Parse a number the way it is typed into a form, accepting a decimal comma
pub fn parse_number(text: &str) -> Option<f64> {
    text.trim()
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
}
