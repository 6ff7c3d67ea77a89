use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use radiology_domain::entities::token::TokenClaims;

/// Envelope returned by the token functions
///
/// `success` is `false` on every error path and `error` carries the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> FunctionResponse<T> {
    /// Successful envelope
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Failed envelope
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Request body of the token validation function
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ValidateTokenRequest {
    /// Signed form-link token
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,
}

/// Request body of the proxied table read
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct TableByTokenRequest {
    /// Signed form-link token
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,

    /// One of `appointments`, `examinations`, `patients`
    #[validate(length(min = 1, max = 63, message = "Table name is required"))]
    pub table_name: String,
}

/// Documentation schema for a successful token validation
#[derive(Debug, Serialize, ToSchema)]
pub struct TokenValidationResponse {
    pub success: bool,
    pub data: Option<TokenClaims>,
    pub error: Option<String>,
}

/// Documentation schema for a proxied table read
#[derive(Debug, Serialize, ToSchema)]
pub struct TableRowResponse {
    pub success: bool,
    /// The requested row, keyed by column name
    #[schema(value_type = Object)]
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
}

/// Documentation schema for a failed function call
#[derive(Debug, Serialize, ToSchema)]
pub struct FunctionErrorResponse {
    /// Always `false`
    pub success: bool,
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_shapes() {
        let ok = serde_json::to_value(FunctionResponse::ok(json!({"id": "apt-1"}))).unwrap();
        assert_eq!(ok, json!({"success": true, "data": {"id": "apt-1"}}));

        let failed = serde_json::to_value(FunctionResponse::<()>::failure("Invalid table name")).unwrap();
        assert_eq!(failed, json!({"success": false, "error": "Invalid table name"}));
    }

    #[test]
    fn test_request_validation() {
        let request = TableByTokenRequest {
            token: String::new(),
            table_name: "patients".to_string(),
        };
        assert!(request.validate().is_err());

        let request = ValidateTokenRequest { token: "a.b".to_string() };
        assert!(request.validate().is_ok());
    }
}
