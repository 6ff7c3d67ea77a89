use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Configure Swagger UI endpoints
pub fn configure_swagger_routes() -> SwaggerUi {
    SwaggerUi::new("/api-docs")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
}

// API Documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        // Health endpoints
        crate::api::handlers::health::health_check,

        // Token functions
        crate::api::handlers::functions::validate_token,
        crate::api::handlers::functions::get_table_by_token,

        // Billing questionnaire endpoints
        crate::api::handlers::billing::create_billing_form,
        crate::api::handlers::billing::get_billing_form,
        crate::api::handlers::billing::evaluate_billing_change,
        crate::api::handlers::billing::get_billing_answers,
        crate::api::handlers::billing::submit_billing_answers,

        // Clinic rows and form links
        crate::api::handlers::form_links::store_table_row,
        crate::api::handlers::form_links::issue_form_link
    ),
    components(
        schemas(
            // Entities
            crate::entities::common::ErrorResponse,
            crate::entities::functions::ValidateTokenRequest,
            crate::entities::functions::TableByTokenRequest,
            crate::entities::functions::TokenValidationResponse,
            crate::entities::functions::TableRowResponse,
            crate::entities::functions::FunctionErrorResponse,
            crate::entities::billing::EvaluateRequest,
            crate::entities::billing::SubmitAnswersRequest,
            crate::entities::billing::SheetResponse,
            crate::entities::billing::EvaluationResponse,
            crate::entities::billing::SubmissionResponse,
            crate::entities::clinic::StoreRowRequest,
            crate::entities::clinic::StoredRowResponse,

            // Health handlers
            crate::api::handlers::health::HealthResponse,
            crate::api::handlers::health::ComponentStatus,
            crate::api::handlers::health::ComponentHealthStatus,

            // Domain schemas
            radiology_domain::entities::token::TokenClaims,
            radiology_domain::entities::token::FormLink,
            radiology_domain::entities::billing::BillingForm,
            radiology_domain::entities::billing::BillingQuestion,
            radiology_domain::entities::billing::BillingOption,
            radiology_domain::entities::billing::QuestionDependency,
            radiology_domain::entities::billing::QuestionType
        )
    ),
    tags(
        (name = "health", description = "Health check endpoint"),
        (name = "functions", description = "Token functions called from patient form links"),
        (name = "billing", description = "Billing questionnaires of examinations"),
        (name = "clinic", description = "Clinic rows and form link issuing")
    ),
    info(
        title = "Radiology Portal API",
        version = "0.1.0",
        description = "Signed form links, proxied table reads, clinic rows and billing questionnaires",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        ),
    ),
    servers(
        (url = "/", description = "Local development server")
    )
)]
pub struct ApiDoc;
