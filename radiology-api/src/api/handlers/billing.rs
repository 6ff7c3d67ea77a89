use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use radiology_domain::entities::billing::BillingForm;
use radiology_domain::services::{BillingServiceError, BillingServiceRef, BillingServiceTrait};

use crate::entities::billing::{
    EvaluateRequest, EvaluationResponse, SheetResponse, SubmissionResponse, SubmitAnswersRequest,
};
use crate::api::extract::{ApiJson, ApiPath};
use crate::entities::common::ErrorResponse;

/// Map service errors to API error responses
fn map_service_error(err: BillingServiceError) -> ErrorResponse {
    match err {
        BillingServiceError::NotFound(msg) => {
            info!("Billing resource not found: {}", msg);
            ErrorResponse::not_found(&msg)
        }
        BillingServiceError::InvalidAppointment(msg) => {
            ErrorResponse::bad_request(&format!("Invalid appointment id: {}", msg))
        }
        BillingServiceError::Answer(e) => ErrorResponse::bad_request(&e.to_string()),
        BillingServiceError::Validation {
            missing_required,
            invalid_numbers,
        } => ErrorResponse::validation_error(
            "Submission is incomplete",
            Some(json!({
                "missing_required": missing_required,
                "invalid_numbers": invalid_numbers,
            })),
        ),
        BillingServiceError::InvalidForm(msg) => {
            error!("Billing form is inconsistent: {}", msg);
            ErrorResponse {
                error: "invalid_form".to_string(),
                message: msg,
                details: None,
            }
        }
        BillingServiceError::Repository(msg) => {
            error!("Billing repository failure: {}", msg);
            ErrorResponse::internal_error()
        }
    }
}

/// Get a billing form with its questions and options
#[utoipa::path(
    get,
    path = "/api/v1/billing-forms/{form_id}",
    params(
        ("form_id" = Uuid, Path, description = "Billing form ID")
    ),
    responses(
        (status = 200, description = "Billing form found", body = BillingForm),
        (status = 404, description = "Billing form not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "billing"
)]
#[instrument(skip(service))]
pub async fn get_billing_form(
    State(service): State<BillingServiceRef>,
    ApiPath(form_id): ApiPath<Uuid>,
) -> Result<Json<BillingForm>, ErrorResponse> {
    let form = service.get_form(form_id).await.map_err(map_service_error)?;
    Ok(Json(form))
}

/// Create or replace a billing form definition
#[utoipa::path(
    post,
    path = "/api/v1/billing-forms",
    request_body = BillingForm,
    responses(
        (status = 201, description = "Billing form stored", body = BillingForm),
        (status = 400, description = "Malformed form or inconsistent dependencies", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "billing"
)]
#[instrument(skip(service, form))]
pub async fn create_billing_form(
    State(service): State<BillingServiceRef>,
    ApiJson(form): ApiJson<BillingForm>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let form = service.save_form(form).await.map_err(|e| match e {
        // A submitted definition that does not hold together is the caller's fault
        BillingServiceError::InvalidForm(msg) => ErrorResponse::bad_request(&msg),
        other => map_service_error(other),
    })?;
    info!("Stored billing form {} with {} questions", form.id, form.questions.len());
    Ok((StatusCode::CREATED, Json(form)))
}

/// Apply one answer change and return the resulting answers and visibility
#[utoipa::path(
    post,
    path = "/api/v1/billing-forms/{form_id}/evaluate",
    params(
        ("form_id" = Uuid, Path, description = "Billing form ID")
    ),
    request_body = EvaluateRequest,
    responses(
        (status = 200, description = "Change applied", body = EvaluationResponse),
        (status = 400, description = "Change does not fit the form", body = ErrorResponse),
        (status = 404, description = "Billing form not found", body = ErrorResponse),
    ),
    tag = "billing"
)]
#[instrument(skip(service, request))]
pub async fn evaluate_billing_change(
    State(service): State<BillingServiceRef>,
    ApiPath(form_id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<EvaluateRequest>,
) -> Result<Json<EvaluationResponse>, ErrorResponse> {
    let evaluation = service
        .evaluate_change(form_id, request.answers, request.change)
        .await
        .map_err(map_service_error)?;
    Ok(Json(evaluation.into()))
}

/// Get the stored answers of an appointment for a billing form
#[utoipa::path(
    get,
    path = "/api/v1/appointments/{appointment_id}/billing-forms/{form_id}/answers",
    params(
        ("appointment_id" = String, Path, description = "Appointment ID"),
        ("form_id" = Uuid, Path, description = "Billing form ID")
    ),
    responses(
        (status = 200, description = "Current answers", body = SheetResponse),
        (status = 404, description = "Billing form not found", body = ErrorResponse),
    ),
    tag = "billing"
)]
#[instrument(skip(service))]
pub async fn get_billing_answers(
    State(service): State<BillingServiceRef>,
    ApiPath((appointment_id, form_id)): ApiPath<(String, Uuid)>,
) -> Result<Json<SheetResponse>, ErrorResponse> {
    let snapshot = service
        .load_sheet(&appointment_id, form_id)
        .await
        .map_err(map_service_error)?;
    Ok(Json(snapshot.into()))
}

/// Replace the stored answers of an appointment for a billing form
#[utoipa::path(
    put,
    path = "/api/v1/appointments/{appointment_id}/billing-forms/{form_id}/answers",
    params(
        ("appointment_id" = String, Path, description = "Appointment ID"),
        ("form_id" = Uuid, Path, description = "Billing form ID")
    ),
    request_body = SubmitAnswersRequest,
    responses(
        (status = 200, description = "Answers stored", body = SubmissionResponse),
        (status = 400, description = "Required questions unanswered or invalid numbers", body = ErrorResponse),
        (status = 404, description = "Billing form not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "billing"
)]
#[instrument(skip(service, request))]
pub async fn submit_billing_answers(
    State(service): State<BillingServiceRef>,
    ApiPath((appointment_id, form_id)): ApiPath<(String, Uuid)>,
    ApiJson(request): ApiJson<SubmitAnswersRequest>,
) -> Result<impl IntoResponse, ErrorResponse> {
    match service.submit(&appointment_id, form_id, request.answers).await {
        Ok(receipt) => {
            info!(
                "Stored {} billing answer rows for appointment {}",
                receipt.rows_written, appointment_id
            );
            Ok((StatusCode::OK, Json(SubmissionResponse::from(receipt))))
        }
        Err(e) => {
            warn!("Billing submission for appointment {} rejected: {}", appointment_id, e);
            Err(map_service_error(e))
        }
    }
}
