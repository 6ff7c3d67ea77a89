use axum::{http::StatusCode, response::IntoResponse, Extension, Json};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Once};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, instrument};
use utoipa::ToSchema;

use radiology_domain::health::{ComponentStatus as DomainComponentStatus, HealthServiceTrait, SystemStatus};

/// Shared health service
pub type HealthServiceRef = Arc<dyn HealthServiceTrait + Send + Sync>;

/// Health check response model
#[derive(Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Current service status ("ok", "degraded", or "error")
    pub status: String,
    /// Current application version from Cargo manifest
    pub version: String,
    /// Timestamp of when the response was generated
    pub timestamp: u64,
    /// Uptime of the service in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime: Option<u64>,
    /// Details about various components of the system
    pub components: ComponentStatus,
    /// Environment information
    pub environment: String,
}

/// Status of individual system components
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ComponentStatus {
    /// Database connection status
    pub database: ComponentHealthStatus,
    /// API status
    pub api: ComponentHealthStatus,
    /// Additional components (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional: Option<serde_json::Value>,
}

/// Health status for an individual component
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ComponentHealthStatus {
    /// Status of the component ("ok", "degraded", or "error")
    pub status: String,
    /// Optional message with more details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

static SERVER_START_TIME: OnceCell<u64> = OnceCell::new();
static INIT: Once = Once::new();

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Record the server start time for uptime reporting
pub fn initialize_server_start_time() {
    INIT.call_once(|| {
        let _ = SERVER_START_TIME.set(unix_now());
    });
}

/// Health check endpoint
///
/// A degraded database still answers 200: the repositories keep serving
/// from in-memory storage when no SQLite pool is available.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "API is healthy or degraded", body = HealthResponse),
        (status = 503, description = "API is not healthy", body = HealthResponse)
    ),
    tag = "health"
)]
#[instrument(skip(health_service))]
pub async fn health_check(Extension(health_service): Extension<HealthServiceRef>) -> impl IntoResponse {
    info!("Health check requested");

    let now = unix_now();
    let uptime = SERVER_START_TIME.get().map(|&start_time| now.saturating_sub(start_time));

    let system_health = health_service.get_system_health().await;

    let overall_status = match system_health.status {
        SystemStatus::Healthy => "ok",
        SystemStatus::Degraded => "degraded",
        SystemStatus::Unhealthy => "error",
    };

    let component = |name: &str| {
        let found = system_health.components.get(name);
        ComponentHealthStatus {
            status: map_component_status(found.map(|c| &c.status).unwrap_or(&DomainComponentStatus::Healthy)),
            message: found.and_then(|c| c.details.clone()),
        }
    };

    let mut components = ComponentStatus {
        database: component("database"),
        api: component("api"),
        additional: None,
    };

    let additional: serde_json::Map<String, serde_json::Value> = system_health
        .components
        .iter()
        .filter(|(name, _)| name.as_str() != "database" && name.as_str() != "api")
        .map(|(name, c)| {
            (
                name.clone(),
                serde_json::json!({
                    "status": map_component_status(&c.status),
                    "message": c.details,
                }),
            )
        })
        .collect();
    if !additional.is_empty() {
        components.additional = Some(additional.into());
    }

    let response = HealthResponse {
        status: overall_status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: now,
        uptime,
        components,
        environment: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
    };

    let status = match system_health.status {
        SystemStatus::Healthy | SystemStatus::Degraded => StatusCode::OK,
        SystemStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(response))
}

fn map_component_status(status: &DomainComponentStatus) -> String {
    match status {
        DomainComponentStatus::Healthy => "ok",
        DomainComponentStatus::Degraded => "degraded",
        DomainComponentStatus::Unhealthy => "error",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use radiology_domain::testing::MockHealthService;

    async fn status_of(service: MockHealthService) -> StatusCode {
        let service: HealthServiceRef = Arc::new(service);
        health_check(Extension(service)).await.into_response().status()
    }

    #[tokio::test]
    async fn test_health_check_response() {
        initialize_server_start_time();
        assert_eq!(status_of(MockHealthService::new()).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_degraded_database_still_ok() {
        assert_eq!(status_of(MockHealthService::new().with_degraded_database()).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unhealthy_database_is_unavailable() {
        assert_eq!(
            status_of(MockHealthService::new().with_unhealthy_database()).await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_component_status_strings() {
        assert_eq!(map_component_status(&DomainComponentStatus::Healthy), "ok");
        assert_eq!(map_component_status(&DomainComponentStatus::Degraded), "degraded");
        assert_eq!(map_component_status(&DomainComponentStatus::Unhealthy), "error");
    }
}
