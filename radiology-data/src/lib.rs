// Radiology portal data layer
// This crate handles persistence of the clinic tables and billing questionnaires

// Database connection management
pub mod database;

// Repository implementations for data access
pub mod repository;

// Data storage models
pub mod models;
