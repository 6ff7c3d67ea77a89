use std::sync::Arc;

use axum::{
    extract::FromRef,
    routing::{get, post, put},
    Extension, Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::debug;

use radiology_domain::auth::{create_validator, LocalTokenValidator};
use radiology_domain::config::TokenConfig;
use radiology_domain::health::create_health_service;
use radiology_domain::services::{
    create_default_billing_service, create_form_link_service, create_table_access_service, create_table_repository,
    BillingServiceRef, FormLinkServiceRef, TableAccessServiceRef,
};

use crate::api::handlers::{billing, form_links, functions, health};
use crate::api::handlers::functions::TokenValidator;
use crate::api::handlers::health::HealthServiceRef;
use crate::openapi::configure_swagger_routes;

/// Services shared by the handlers
#[derive(Clone, FromRef)]
pub struct AppState {
    /// Validator behind the token validation function
    pub token_validator: TokenValidator,
    /// Proxied table reads
    pub table_access: TableAccessServiceRef,
    /// Billing questionnaires
    pub billing: BillingServiceRef,
    /// Clinic rows and form link issuing
    pub form_links: FormLinkServiceRef,
}

impl AppState {
    /// Wire the default services from a token configuration
    ///
    /// The validation function always verifies in process; the proxied read
    /// goes through a remote validator when `validation_url` is set. Stored
    /// clinic rows and proxied reads share one repository.
    pub fn from_config(config: &TokenConfig) -> Self {
        let token_validator: TokenValidator = Arc::new(LocalTokenValidator::new(config));
        let tables = create_table_repository();
        let table_access = create_table_access_service(create_validator(config), tables.clone());

        Self {
            token_validator,
            table_access,
            billing: create_default_billing_service(),
            form_links: create_form_link_service(config, tables),
        }
    }
}

/// Create the application router from prepared services
pub fn create_router(state: AppState, health_service: HealthServiceRef) -> Router {
    // Token functions answer every method but POST with a 405 envelope
    let function_routes = Router::new()
        .route(
            "/functions/v1/validate-token",
            post(functions::validate_token).fallback(functions::method_not_allowed),
        )
        .route(
            "/functions/v1/get-table-by-token",
            post(functions::get_table_by_token).fallback(functions::method_not_allowed),
        );

    debug!("Function routes configured");

    // Define specific routes before parametrized routes to avoid conflicts
    let billing_routes = Router::new()
        .route("/billing-forms", post(billing::create_billing_form))
        .route("/billing-forms/:form_id/evaluate", post(billing::evaluate_billing_change))
        .route("/billing-forms/:form_id", get(billing::get_billing_form))
        .route(
            "/appointments/:appointment_id/billing-forms/:form_id/answers",
            get(billing::get_billing_answers).put(billing::submit_billing_answers),
        );

    debug!("Billing routes configured");

    let clinic_routes = Router::new()
        .route("/tables/:table/:id", put(form_links::store_table_row))
        .route("/appointments/:appointment_id/form-link", post(form_links::issue_form_link));

    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .layer(Extension(health_service));

    let app = Router::new()
        .merge(function_routes)
        .nest("/api/v1", billing_routes.merge(clinic_routes))
        .with_state(state)
        .merge(public_routes);

    debug!("Base routes merged");

    let app = add_swagger_ui(app)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    health::initialize_server_start_time();
    debug!("Health check service initialized");

    app
}

/// Create the application router with services configured from the environment
pub async fn create_app() -> Router {
    debug!("Creating application router");

    let config = TokenConfig::from_env();
    let state = AppState::from_config(&config);
    let health_service = create_health_service();

    create_router(state, health_service)
}

/// Add Swagger UI to the router
pub fn add_swagger_ui(app: Router) -> Router {
    app.merge(configure_swagger_routes())
}
