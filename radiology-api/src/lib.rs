// Radiology portal API
//
// HTTP surface of the portal backend: the token functions used by the
// patient form links and the billing questionnaire endpoints.

pub mod api;
pub mod entities;
pub mod openapi;
