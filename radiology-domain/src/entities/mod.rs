// Domain entities and value objects
pub mod billing;
pub mod conversions;
pub mod token;

// Re-export common types for easier imports
pub use billing::{
    AnswerValue, BillingAnswerRow, BillingForm, BillingOption, BillingQuestion, QuestionDependency, QuestionType,
};
pub use token::{FormLink, TokenClaims, TokenPayload};
