pub mod dependency_graph;
pub mod answer_sheet;
pub mod billing;
pub mod table_access;
pub mod form_links;

// Domain services
// This module contains business logic implementations.

// Re-export service traits and factory functions
pub use billing::{
    create_default_billing_service, AnswerChange, BillingService, BillingServiceError, BillingServiceRef,
    BillingServiceTrait, Evaluation, SheetSnapshot, SubmissionReceipt,
};
pub use table_access::{
    create_table_access_service, create_table_repository, TableAccessError, TableAccessService,
    TableAccessServiceRef, TableAccessServiceTrait, TableRepositoryRef,
};
pub use form_links::{
    create_form_link_service, FormLinkError, FormLinkService, FormLinkServiceRef, FormLinkServiceTrait,
};
pub use dependency_graph::{DependencyGraph, GraphError};
pub use answer_sheet::{AnswerError, AnswerSheet, Propagation};
