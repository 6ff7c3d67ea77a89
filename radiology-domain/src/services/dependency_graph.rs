//! Question dependency graph of a billing form
//!
//! Every question has at most one parent edge: the question whose answer
//! controls it and the option that must be selected there. The graph is a
//! forest, so visibility and cleanup are plain traversals from a root.

use std::collections::{HashMap, HashSet, VecDeque};

use thiserror::Error;
use uuid::Uuid;

use crate::entities::billing::{AnswerValue, BillingOption, BillingQuestion};

/// Errors raised while building a dependency graph
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// A dependency points at a question outside the form
    #[error("Question {question_id} depends on unknown question {depends_on}")]
    UnknownQuestion { question_id: Uuid, depends_on: Uuid },

    /// A dependency names an option of a different question
    #[error("Question {question_id} depends on option {option_id}, which does not belong to question {depends_on}")]
    ForeignOption {
        question_id: Uuid,
        depends_on: Uuid,
        option_id: Uuid,
    },

    /// A question depends on itself
    #[error("Question {0} depends on itself")]
    SelfDependency(Uuid),

    /// Dependencies form a cycle through this question
    #[error("Dependency cycle through question {0}")]
    Cycle(Uuid),

    /// The same question id appears twice
    #[error("Duplicate question {0}")]
    DuplicateQuestion(Uuid),

    /// An option belongs to a question outside the form
    #[error("Option {option_id} belongs to unknown question {question_id}")]
    UnknownOptionOwner { option_id: Uuid, question_id: Uuid },
}

/// Validated dependency structure of one billing form
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// Questions in `position` order
    questions: Vec<BillingQuestion>,
    index: HashMap<Uuid, usize>,
    /// Options per question in `position` order
    options: HashMap<Uuid, Vec<BillingOption>>,
    option_owner: HashMap<Uuid, Uuid>,
    /// Direct dependents per question in `position` order
    children: HashMap<Uuid, Vec<Uuid>>,
}

impl DependencyGraph {
    /// Validate questions and options and build the graph
    pub fn build(mut questions: Vec<BillingQuestion>, mut options: Vec<BillingOption>) -> Result<Self, GraphError> {
        questions.sort_by_key(|q| q.position);
        options.sort_by_key(|o| o.position);

        let mut index = HashMap::with_capacity(questions.len());
        for (i, question) in questions.iter().enumerate() {
            if index.insert(question.id, i).is_some() {
                return Err(GraphError::DuplicateQuestion(question.id));
            }
        }

        let mut option_owner = HashMap::with_capacity(options.len());
        let mut grouped: HashMap<Uuid, Vec<BillingOption>> = HashMap::new();
        for option in options {
            if !index.contains_key(&option.question_id) {
                return Err(GraphError::UnknownOptionOwner {
                    option_id: option.id,
                    question_id: option.question_id,
                });
            }
            option_owner.insert(option.id, option.question_id);
            grouped.entry(option.question_id).or_default().push(option);
        }

        let mut children: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for question in &questions {
            let Some(dep) = question.depends_on else { continue };

            if dep.question_id == question.id {
                return Err(GraphError::SelfDependency(question.id));
            }
            if !index.contains_key(&dep.question_id) {
                return Err(GraphError::UnknownQuestion {
                    question_id: question.id,
                    depends_on: dep.question_id,
                });
            }
            if option_owner.get(&dep.option_id) != Some(&dep.question_id) {
                return Err(GraphError::ForeignOption {
                    question_id: question.id,
                    depends_on: dep.question_id,
                    option_id: dep.option_id,
                });
            }
            children.entry(dep.question_id).or_default().push(question.id);
        }

        let graph = Self {
            questions,
            index,
            options: grouped,
            option_owner,
            children,
        };
        graph.check_acyclic()?;
        Ok(graph)
    }

    /// Each node has one parent, so a cycle shows up as a parent chain
    /// longer than the number of questions
    fn check_acyclic(&self) -> Result<(), GraphError> {
        let limit = self.questions.len();
        for question in &self.questions {
            let mut current = question.depends_on.map(|d| d.question_id);
            let mut steps = 0;
            while let Some(id) = current {
                steps += 1;
                if id == question.id || steps > limit {
                    return Err(GraphError::Cycle(question.id));
                }
                current = self.question(id).and_then(|q| q.depends_on).map(|d| d.question_id);
            }
        }
        Ok(())
    }

    /// Look up a question
    pub fn question(&self, id: Uuid) -> Option<&BillingQuestion> {
        self.index.get(&id).map(|&i| &self.questions[i])
    }

    /// All questions in form order
    pub fn questions(&self) -> &[BillingQuestion] {
        &self.questions
    }

    /// Options of a question in display order
    pub fn options_for(&self, question_id: Uuid) -> &[BillingOption] {
        self.options.get(&question_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether an option belongs to a question
    pub fn option_belongs(&self, question_id: Uuid, option_id: Uuid) -> bool {
        self.option_owner.get(&option_id) == Some(&question_id)
    }

    /// Questions directly controlled by `question_id`
    pub fn dependents(&self, question_id: Uuid) -> &[Uuid] {
        self.children.get(&question_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All questions transitively controlled by `question_id`, breadth first
    ///
    /// A parent always comes before its own dependents.
    pub fn descendants(&self, question_id: Uuid) -> Vec<Uuid> {
        let mut result = Vec::new();
        let mut seen = HashSet::new();
        let mut queue: VecDeque<Uuid> = self.dependents(question_id).iter().copied().collect();

        while let Some(id) = queue.pop_front() {
            if !seen.insert(id) {
                continue;
            }
            result.push(id);
            queue.extend(self.dependents(id).iter().copied());
        }
        result
    }

    /// Every question ordered so that parents precede their dependents,
    /// roots in form order
    pub fn topological_order(&self) -> Vec<Uuid> {
        let mut order = Vec::with_capacity(self.questions.len());
        for root in self.questions.iter().filter(|q| q.depends_on.is_none()) {
            order.push(root.id);
            order.extend(self.descendants(root.id));
        }
        order
    }

    /// Whether a question is shown under the given answers
    ///
    /// A question without dependency is always visible. A dependent question
    /// is visible when its controlling question is visible and its answer
    /// selects the required option. Unknown ids are never visible.
    pub fn is_visible(&self, question_id: Uuid, answers: &HashMap<Uuid, AnswerValue>) -> bool {
        let mut current = question_id;
        // Bounded by the depth of the tree, which build() checked
        for _ in 0..=self.questions.len() {
            let Some(question) = self.question(current) else {
                return false;
            };
            match question.depends_on {
                None => return true,
                Some(dep) => {
                    let selected = answers
                        .get(&dep.question_id)
                        .map(|answer| answer.selects(dep.option_id))
                        .unwrap_or(false);
                    if !selected {
                        return false;
                    }
                    current = dep.question_id;
                }
            }
        }
        false
    }
}
