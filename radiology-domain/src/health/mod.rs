//! Domain layer health check functionality
//! This module provides health check services for the application

use radiology_data::database::{self, DatabaseError};
use std::collections::HashMap;
use async_trait::async_trait;

/// System health status
#[derive(Debug, Clone, PartialEq)]
pub enum SystemStatus {
    /// All components are healthy
    Healthy,
    /// Some components are degraded but the system is functional
    Degraded,
    /// System is not functioning properly
    Unhealthy,
}

/// Component health status
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentStatus {
    /// Component is functioning normally
    Healthy,
    /// Component is functioning but with reduced capability
    Degraded,
    /// Component is not functioning
    Unhealthy,
}

/// Represents a health component with status and optional details
#[derive(Debug, Clone)]
pub struct HealthComponent {
    /// Status of the component
    pub status: ComponentStatus,
    /// Optional details about the component status
    pub details: Option<String>,
}

/// Represents the overall health of the system
#[derive(Debug, Clone)]
pub struct SystemHealth {
    /// Overall system status
    pub status: SystemStatus,
    /// Map of component names to their health status
    pub components: HashMap<String, HealthComponent>,
}

impl SystemHealth {
    /// Derive the overall status from the worst component
    pub fn from_components(components: HashMap<String, HealthComponent>) -> Self {
        let status = if components.values().any(|c| c.status == ComponentStatus::Unhealthy) {
            SystemStatus::Unhealthy
        } else if components.values().any(|c| c.status == ComponentStatus::Degraded) {
            SystemStatus::Degraded
        } else {
            SystemStatus::Healthy
        };

        Self { status, components }
    }
}

/// Trait for health services
#[async_trait]
pub trait HealthServiceTrait: Send + Sync + std::fmt::Debug {
    /// Get the overall system health
    async fn get_system_health(&self) -> SystemHealth;

    /// Check the status of the database
    /// Returns true if the database is healthy, false if not
    /// Returns an error if the check could not be performed
    async fn check_database_status(&self) -> Result<bool, String>;
}

/// Check if the database is available and functioning properly
///
/// Returns:
/// - Ok(true) if the SQLite pool is serving connections
/// - Ok(false) if no pool was initialized and repositories run in memory
/// - Err if the pool exists but cannot hand out connections
pub async fn check_database_status() -> Result<bool, String> {
    match database::get_connection_info() {
        Some(info) => {
            if info.contains("healthy") {
                Ok(true)
            } else {
                Err(info)
            }
        },
        None => match database::get_db_pool() {
            Ok(_) => Ok(true),
            Err(DatabaseError::PoolNotInitialized) => Ok(false),
            Err(e) => Err(format!("Database connection error: {}", e)),
        },
    }
}

/// Health service backed by the shared database pool
#[derive(Debug, Default)]
pub struct HealthService;

impl HealthService {
    /// Create a new health service
    pub fn new() -> Self {
        HealthService
    }
}

#[async_trait]
impl HealthServiceTrait for HealthService {
    async fn get_system_health(&self) -> SystemHealth {
        let mut components = HashMap::new();

        let database = match self.check_database_status().await {
            Ok(true) => HealthComponent {
                status: ComponentStatus::Healthy,
                details: database::get_connection_info(),
            },
            Ok(false) => HealthComponent {
                status: ComponentStatus::Degraded,
                details: Some("Database not initialized, serving from in-memory storage".to_string()),
            },
            Err(e) => HealthComponent {
                status: ComponentStatus::Unhealthy,
                details: Some(e),
            },
        };
        components.insert("database".to_string(), database);

        components.insert(
            "api".to_string(),
            HealthComponent {
                status: ComponentStatus::Healthy,
                details: None,
            },
        );

        SystemHealth::from_components(components)
    }

    async fn check_database_status(&self) -> Result<bool, String> {
        check_database_status().await
    }
}

/// Factory function to create a health service
pub fn create_health_service() -> std::sync::Arc<dyn HealthServiceTrait + Send + Sync> {
    std::sync::Arc::new(HealthService::new())
}
