// Storage-shaped records
pub mod billing;
pub mod row;

pub use billing::{BillingAnswerRecord, BillingFormRecord, BillingOptionRecord, BillingQuestionRecord};
pub use row::Row;
