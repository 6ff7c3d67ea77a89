// Public entities for the radiology portal API
// This module contains data structures that are shared across the application boundary

// Common entities for error handling
pub mod common;

// Request and response envelopes of the token functions
pub mod functions;

// Billing questionnaire requests and responses
pub mod billing;

// Clinic rows and form links maintained by staff
pub mod clinic;
