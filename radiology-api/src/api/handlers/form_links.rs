use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use tracing::{error, info, instrument, warn};

use radiology_domain::auth::TokenError;
use radiology_domain::entities::token::FormLink;
use radiology_domain::services::{FormLinkError, FormLinkServiceRef, FormLinkServiceTrait};

use crate::api::extract::{ApiJson, ApiPath};
use crate::entities::clinic::{StoreRowRequest, StoredRowResponse};
use crate::entities::common::ErrorResponse;

fn map_form_link_error(err: FormLinkError) -> ErrorResponse {
    match err {
        FormLinkError::Invalid(msg) => ErrorResponse::bad_request(&msg),
        FormLinkError::NotFound(appointment_id) => {
            ErrorResponse::not_found(&format!("Appointment {} not found", appointment_id))
        }
        FormLinkError::Token(TokenError::Config(msg)) => {
            error!("Form link signing is not configured: {}", msg);
            ErrorResponse::internal_error()
        }
        FormLinkError::Token(e) => ErrorResponse::bad_request(&e.to_string()),
        FormLinkError::Repository(msg) => {
            error!("Clinic table repository failure: {}", msg);
            ErrorResponse::internal_error()
        }
    }
}

/// Insert or replace a patient, examination or appointment row
#[utoipa::path(
    put,
    path = "/api/v1/tables/{table}/{id}",
    params(
        ("table" = String, Path, description = "appointments, examinations or patients"),
        ("id" = String, Path, description = "Row ID")
    ),
    request_body = StoreRowRequest,
    responses(
        (status = 200, description = "Row stored", body = StoredRowResponse),
        (status = 400, description = "Unknown table or unusable columns", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "clinic"
)]
#[instrument(skip(service, request))]
pub async fn store_table_row(
    State(service): State<FormLinkServiceRef>,
    ApiPath((table, id)): ApiPath<(String, String)>,
    ApiJson(request): ApiJson<StoreRowRequest>,
) -> Result<Json<StoredRowResponse>, ErrorResponse> {
    let row = service
        .store_row(&table, &id, request.0)
        .await
        .map_err(map_form_link_error)?;
    Ok(Json(StoredRowResponse { table, row }))
}

/// Issue a signed form link for a stored appointment
#[utoipa::path(
    post,
    path = "/api/v1/appointments/{appointment_id}/form-link",
    params(
        ("appointment_id" = String, Path, description = "Appointment ID")
    ),
    responses(
        (status = 201, description = "Link issued", body = FormLink),
        (status = 400, description = "Appointment has no examination", body = ErrorResponse),
        (status = 404, description = "Appointment not found", body = ErrorResponse),
        (status = 500, description = "Token secret is not configured", body = ErrorResponse),
    ),
    tag = "clinic"
)]
#[instrument(skip(service))]
pub async fn issue_form_link(
    State(service): State<FormLinkServiceRef>,
    ApiPath(appointment_id): ApiPath<String>,
) -> Result<impl IntoResponse, ErrorResponse> {
    match service.issue_link(&appointment_id).await {
        Ok(link) => {
            info!("Issued form link for appointment {}, valid until {}", appointment_id, link.expires_at);
            Ok((StatusCode::CREATED, Json(link)))
        }
        Err(e) => {
            warn!("Form link for appointment {} refused: {}", appointment_id, e);
            Err(map_form_link_error(e))
        }
    }
}
