use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{FromRequest, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use validator::Validate;

use radiology_domain::auth::{TokenValidationError, TokenValidatorTrait};
use radiology_domain::entities::token::TokenClaims;
use radiology_domain::services::{TableAccessError, TableAccessServiceRef, TableAccessServiceTrait};

use crate::entities::functions::{
    FunctionErrorResponse, FunctionResponse, TableByTokenRequest, TableRowResponse, TokenValidationResponse,
    ValidateTokenRequest,
};

/// Shared token validator
pub type TokenValidator = Arc<dyn TokenValidatorTrait>;

/// Errors of the token functions, rendered as a failed envelope
#[derive(Debug, Error)]
pub enum FunctionError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("{0}")]
    Internal(String),
}

impl FunctionError {
    fn status(&self) -> StatusCode {
        match self {
            FunctionError::BadRequest(_) => StatusCode::BAD_REQUEST,
            FunctionError::NotFound(_) => StatusCode::NOT_FOUND,
            FunctionError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            FunctionError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for FunctionError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(FunctionResponse::<()>::failure(self.to_string()))).into_response()
    }
}

impl From<TokenValidationError> for FunctionError {
    fn from(err: TokenValidationError) -> Self {
        if err.is_client_error() {
            FunctionError::BadRequest(err.to_string())
        } else {
            error!("Token validation failed on the server side: {}", err);
            FunctionError::Internal(err.to_string())
        }
    }
}

impl From<TableAccessError> for FunctionError {
    fn from(err: TableAccessError) -> Self {
        match err {
            TableAccessError::InvalidTable(_) => FunctionError::BadRequest("Invalid table name".to_string()),
            TableAccessError::Token(e) => e.into(),
            TableAccessError::NotFound { .. } => FunctionError::NotFound(err.to_string()),
            TableAccessError::Repository(msg) => {
                error!("Proxied table read failed: {}", msg);
                FunctionError::Internal("Failed to read table".to_string())
            }
        }
    }
}

/// JSON body extractor that rejects with a failed envelope instead of
/// axum's plain-text rejection, then runs `validator` checks
pub struct FunctionJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for FunctionJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = FunctionError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|rejection| {
            warn!("Rejected function request body: {}", rejection.body_text());
            FunctionError::BadRequest(format!("Invalid request body: {}", rejection.body_text()))
        })?;

        value
            .validate()
            .map_err(|errors| FunctionError::BadRequest(validation_message(&errors)))?;

        Ok(FunctionJson(value))
    }
}

/// First validation message, or a generic one
fn validation_message(errors: &validator::ValidationErrors) -> String {
    errors
        .field_errors()
        .iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| match e.message {
                Some(ref msg) => msg.to_string(),
                None => format!("Invalid {}", field),
            })
        })
        .next()
        .unwrap_or_else(|| "Invalid request body".to_string())
}

/// Validate a signed form-link token
#[utoipa::path(
    post,
    path = "/functions/v1/validate-token",
    request_body = ValidateTokenRequest,
    responses(
        (status = 200, description = "Token is valid", body = TokenValidationResponse),
        (status = 400, description = "Token is malformed, forged or expired", body = FunctionErrorResponse),
        (status = 405, description = "Method not allowed", body = FunctionErrorResponse),
        (status = 500, description = "Token secret is not configured", body = FunctionErrorResponse),
    ),
    tag = "functions"
)]
#[instrument(skip(validator, request))]
pub async fn validate_token(
    State(validator): State<TokenValidator>,
    FunctionJson(request): FunctionJson<ValidateTokenRequest>,
) -> Result<Json<FunctionResponse<TokenClaims>>, FunctionError> {
    let claims = validator.validate(&request.token).await?;
    info!("Validated token for appointment {}", claims.appointment_id);
    Ok(Json(FunctionResponse::ok(claims)))
}

/// Read the row of an allowed table that belongs to the token's appointment
#[utoipa::path(
    post,
    path = "/functions/v1/get-table-by-token",
    request_body = TableByTokenRequest,
    responses(
        (status = 200, description = "Row found", body = TableRowResponse),
        (status = 400, description = "Invalid table name or token", body = FunctionErrorResponse),
        (status = 404, description = "No row for the appointment", body = FunctionErrorResponse),
        (status = 405, description = "Method not allowed", body = FunctionErrorResponse),
        (status = 500, description = "Validation or storage failure", body = FunctionErrorResponse),
    ),
    tag = "functions"
)]
#[instrument(skip(service, request), fields(table = %request.table_name))]
pub async fn get_table_by_token(
    State(service): State<TableAccessServiceRef>,
    FunctionJson(request): FunctionJson<TableByTokenRequest>,
) -> Result<Json<FunctionResponse<serde_json::Value>>, FunctionError> {
    let row = service.read_by_token(&request.token, &request.table_name).await?;
    Ok(Json(FunctionResponse::ok(serde_json::Value::Object(row))))
}

/// Any method other than POST on a function route
pub async fn method_not_allowed() -> FunctionError {
    FunctionError::MethodNotAllowed
}
