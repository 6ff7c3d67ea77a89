// Radiology portal domain
// This crate contains the business logic of the portal backend

// Configuration read from the environment
pub mod config;

// Signed form-link tokens and their validation
pub mod auth;

// Domain entities
pub mod entities;

// Services that implement business logic
pub mod services;

// Health checks and system status
pub mod health;

// Re-export the database module from the data layer for convenience
pub use radiology_data::database;

// Testing utilities - only available with mock feature
#[cfg(any(test, feature = "mock"))]
pub mod testing;
