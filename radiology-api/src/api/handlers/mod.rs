pub mod billing;
pub mod form_links;
pub mod functions;
pub mod health;

// Re-export handlers for easier imports
pub use billing::{
    create_billing_form, evaluate_billing_change, get_billing_answers, get_billing_form, submit_billing_answers,
};
pub use form_links::{issue_form_link, store_table_row};
pub use functions::{get_table_by_token, method_not_allowed, validate_token, TokenValidator};
pub use health::health_check;
