use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

use radiology_api::api::handlers::health::HealthServiceRef;
use radiology_api::api::routes::{create_router, AppState};
use radiology_domain::auth::{LocalTokenValidator, TokenError, TokenSigner, TokenValidationError};
use radiology_domain::config::TokenConfig;
use radiology_domain::entities::billing::QuestionDependency;
use radiology_domain::services::{
    create_form_link_service, BillingServiceTrait, FormLinkServiceRef, TableAccessService, TableAccessServiceRef,
    TableRepositoryRef,
};
use radiology_domain::testing::{
    create_mock_billing_service, sample_billing_form, MockBillingRepository, MockHealthService, MockTableRepository,
    MockTokenValidator, SampleFormIds,
};

fn validator() -> MockTokenValidator {
    MockTokenValidator::new()
        .with_token("token-apt-1", "apt-1", "exam-1")
        .with_token("token-apt-2", "apt-2", "exam-2")
}

fn tables() -> TableRepositoryRef {
    Arc::new(MockTableRepository::new().with_row(
        "appointments",
        json!({"id": "apt-1", "status": "scheduled", "examination_id": "exam-1"})
            .as_object()
            .cloned()
            .unwrap(),
    ))
}

fn table_access(validator: MockTokenValidator) -> TableAccessServiceRef {
    Arc::new(TableAccessService::new(Arc::new(validator), tables()))
}

fn form_links() -> FormLinkServiceRef {
    create_form_link_service(&TokenConfig::with_secret("link-secret"), tables())
}

async fn test_app() -> (Router, SampleFormIds) {
    let billing = create_mock_billing_service(MockBillingRepository::new());
    let (form, ids) = sample_billing_form();
    billing.save_form(form).await.unwrap();

    let state = AppState {
        token_validator: Arc::new(validator()),
        table_access: table_access(validator()),
        billing,
        form_links: form_links(),
    };
    let health: HealthServiceRef = Arc::new(MockHealthService::new());
    (create_router(state, health), ids)
}

async fn send(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_validate_token_returns_claims() {
    let (app, _) = test_app().await;
    let (status, body) = send(
        app,
        Method::POST,
        "/functions/v1/validate-token",
        Some(json!({"token": "token-apt-1"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"success": true, "data": {"appointment_id": "apt-1", "examination_id": "exam-1"}})
    );
}

#[tokio::test]
async fn test_validate_token_rejects_unknown_token() {
    let (app, _) = test_app().await;
    let (status, body) = send(
        app,
        Method::POST,
        "/functions/v1/validate-token",
        Some(json!({"token": "forged"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));
    assert!(body["error"].is_string());
    assert!(body.get("data").is_none());
}

#[tokio::test]
async fn test_function_routes_only_accept_post() {
    let (app, _) = test_app().await;
    let (status, body) = send(app.clone(), Method::GET, "/functions/v1/validate-token", None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body, json!({"success": false, "error": "Method not allowed"}));

    let (status, _) = send(app, Method::PUT, "/functions/v1/get-table-by-token", None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_function_body_errors_use_the_envelope() {
    let (app, _) = test_app().await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/functions/v1/validate-token")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["success"], json!(false));

    let (status, body) = send(app.clone(), Method::POST, "/functions/v1/get-table-by-token", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));

    let (status, body) = send(
        app,
        Method::POST,
        "/functions/v1/validate-token",
        Some(json!({"token": ""})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("Token is required"));
}

#[tokio::test]
async fn test_get_table_by_token_returns_row() {
    let (app, _) = test_app().await;
    let (status, body) = send(
        app,
        Method::POST,
        "/functions/v1/get-table-by-token",
        Some(json!({"token": "token-apt-1", "table_name": "appointments"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["data"]["id"], json!("apt-1"));
    assert_eq!(body["data"]["status"], json!("scheduled"));
}

#[tokio::test]
async fn test_get_table_by_token_rejects_other_tables() {
    let (app, _) = test_app().await;
    for table in ["users", "billing_answers", "appointments; drop table patients"] {
        let (status, body) = send(
            app.clone(),
            Method::POST,
            "/functions/v1/get-table-by-token",
            Some(json!({"token": "token-apt-1", "table_name": table})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "table {}", table);
        assert_eq!(body, json!({"success": false, "error": "Invalid table name"}));
    }
}

#[tokio::test]
async fn test_table_is_checked_before_token() {
    let (app, _) = test_app().await;
    let (status, body) = send(
        app,
        Method::POST,
        "/functions/v1/get-table-by-token",
        Some(json!({"token": "forged", "table_name": "users"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("Invalid table name"));
}

#[tokio::test]
async fn test_get_table_by_token_missing_row() {
    let (app, _) = test_app().await;
    let (status, body) = send(
        app,
        Method::POST,
        "/functions/v1/get-table-by-token",
        Some(json!({"token": "token-apt-2", "table_name": "appointments"})),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], json!(false));
}

#[tokio::test]
async fn test_unconfigured_secret_is_a_server_error() {
    let failing = MockTokenValidator::new().failing_with(TokenValidationError::Token(TokenError::Config(
        "TOKEN_SECRET environment variable not found".to_string(),
    )));
    let state = AppState {
        token_validator: Arc::new(failing.clone()),
        table_access: table_access(failing),
        billing: create_mock_billing_service(MockBillingRepository::new()),
        form_links: form_links(),
    };
    let app = create_router(state, Arc::new(MockHealthService::new()));

    let (status, body) = send(
        app.clone(),
        Method::POST,
        "/functions/v1/validate-token",
        Some(json!({"token": "token-apt-1"})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], json!(false));

    let (status, _) = send(
        app,
        Method::POST,
        "/functions/v1/get-table-by-token",
        Some(json!({"token": "token-apt-1", "table_name": "patients"})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_signed_token_round_trip_through_http() {
    let signer = TokenSigner::new("clinic-secret").unwrap();
    let token = signer.issue("apt-7", "exam-3", Duration::hours(1), Utc::now()).unwrap();
    let expired = signer
        .issue("apt-7", "exam-3", Duration::hours(1), Utc::now() - Duration::hours(2))
        .unwrap();

    let state = AppState {
        token_validator: Arc::new(LocalTokenValidator::with_signer(signer)),
        table_access: table_access(MockTokenValidator::new()),
        billing: create_mock_billing_service(MockBillingRepository::new()),
        form_links: form_links(),
    };
    let app = create_router(state, Arc::new(MockHealthService::new()));

    let (status, body) = send(
        app.clone(),
        Method::POST,
        "/functions/v1/validate-token",
        Some(json!({"token": token})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["appointment_id"], json!("apt-7"));

    let (status, body) = send(
        app,
        Method::POST,
        "/functions/v1/validate-token",
        Some(json!({"token": expired})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));
}

#[tokio::test]
async fn test_cors_preflight_on_function_routes() {
    let (app, _) = test_app().await;
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/functions/v1/validate-token")
        .header(header::ORIGIN, "https://forms.example.org")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
}

#[tokio::test]
async fn test_get_billing_form() {
    let (app, ids) = test_app().await;
    let (status, body) = send(app, Method::GET, &format!("/api/v1/billing-forms/{}", ids.form), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], json!(ids.form));
    assert_eq!(body["questions"].as_array().map(Vec::len), Some(3));
}

#[tokio::test]
async fn test_unknown_billing_form_is_not_found() {
    let (app, _) = test_app().await;
    let (status, body) = send(
        app,
        Method::GET,
        &format!("/api/v1/billing-forms/{}", uuid::Uuid::new_v4()),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], json!("not_found"));
}

#[tokio::test]
async fn test_evaluate_shows_dependent_question() {
    let (app, ids) = test_app().await;
    let (status, body) = send(
        app.clone(),
        Method::POST,
        &format!("/api/v1/billing-forms/{}/evaluate", ids.form),
        Some(json!({
            "answers": {},
            "change": {
                "action": "set",
                "question_id": ids.contrast,
                "value": {"kind": "choice", "value": ids.contrast_ja}
            }
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["shown"], json!([ids.amount]));
    let visible = body["sheet"]["visible_questions"].as_array().unwrap();
    assert!(visible.contains(&json!(ids.amount)));

    // Switching to Nein hides the amount again
    let (status, body) = send(
        app,
        Method::POST,
        &format!("/api/v1/billing-forms/{}/evaluate", ids.form),
        Some(json!({
            "answers": body["sheet"]["answers"],
            "change": {
                "action": "set",
                "question_id": ids.contrast,
                "value": {"kind": "choice", "value": ids.contrast_nein}
            }
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["hidden"], json!([ids.amount]));
    assert!(body["sheet"]["answers"].get(ids.amount.to_string()).is_none());
}

#[tokio::test]
async fn test_evaluate_rejects_foreign_option() {
    let (app, ids) = test_app().await;
    let (status, body) = send(
        app,
        Method::POST,
        &format!("/api/v1/billing-forms/{}/evaluate", ids.form),
        Some(json!({
            "change": {
                "action": "set",
                "question_id": ids.contrast,
                "value": {"kind": "choice", "value": ids.extras_first}
            }
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("bad_request"));
}

#[tokio::test]
async fn test_submit_and_reload_answers() {
    let (app, ids) = test_app().await;
    let uri = format!("/api/v1/appointments/apt-1/billing-forms/{}/answers", ids.form);

    let (status, body) = send(
        app.clone(),
        Method::PUT,
        &uri,
        Some(json!({
            "answers": {
                ids.contrast.to_string(): {"kind": "choice", "value": ids.contrast_ja},
                ids.amount.to_string(): {"kind": "text", "value": "12,5"},
                ids.extras.to_string(): {"kind": "choices", "value": [ids.extras_first, ids.extras_second]}
            }
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment_id"], json!("apt-1"));
    assert_eq!(body["rows_written"], json!(4));

    let (status, body) = send(app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["answers"][ids.contrast.to_string()],
        json!({"kind": "choice", "value": ids.contrast_ja})
    );
    let extras = body["answers"][ids.extras.to_string()]["value"].as_array().unwrap();
    assert_eq!(extras.len(), 2);
    assert!(extras.contains(&json!(ids.extras_first)));
    assert!(extras.contains(&json!(ids.extras_second)));
    assert_eq!(body["missing_required"], json!([]));
}

#[tokio::test]
async fn test_submit_reports_missing_required() {
    let (app, ids) = test_app().await;
    let (status, body) = send(
        app,
        Method::PUT,
        &format!("/api/v1/appointments/apt-1/billing-forms/{}/answers", ids.form),
        Some(json!({
            "answers": {
                ids.contrast.to_string(): {"kind": "choice", "value": ids.contrast_ja}
            }
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("validation_error"));
    assert_eq!(body["details"]["missing_required"], json!([ids.amount]));
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _) = test_app().await;
    let (status, body) = send(app, Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("ok"));
    assert_eq!(body["components"]["database"]["status"], json!("ok"));
}

#[tokio::test]
async fn test_billing_body_errors_are_json() {
    let (app, ids) = test_app().await;

    let (status, body) = send(
        app.clone(),
        Method::PUT,
        &format!("/api/v1/appointments/apt-1/billing-forms/{}/answers", ids.form),
        Some(json!({"answers": {"not-a-uuid": {"kind": "text", "value": "1"}}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("bad_request"));

    let request = Request::builder()
        .method(Method::POST)
        .uri(format!("/api/v1/billing-forms/{}/evaluate", ids.form))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()),
        Some("application/json")
    );
}

#[tokio::test]
async fn test_billing_path_errors_are_json() {
    let (app, _) = test_app().await;

    let (status, body) = send(app.clone(), Method::GET, "/api/v1/billing-forms/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("bad_request"));

    let (status, body) = send(app, Method::GET, "/api/v1/appointments/apt-1/billing-forms/123/answers", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("bad_request"));
}

#[tokio::test]
async fn test_blank_appointment_is_a_bad_request() {
    let (app, ids) = test_app().await;
    let (status, body) = send(
        app,
        Method::PUT,
        &format!("/api/v1/appointments/%20/billing-forms/{}/answers", ids.form),
        Some(json!({
            "answers": {
                ids.contrast.to_string(): {"kind": "choice", "value": ids.contrast_nein}
            }
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("bad_request"));
}

#[tokio::test]
async fn test_create_billing_form_then_fetch() {
    let app = create_router(
        AppState::from_config(&TokenConfig::with_secret("clinic-secret")),
        Arc::new(MockHealthService::new()),
    );
    let (form, ids) = sample_billing_form();

    let (status, body) = send(
        app.clone(),
        Method::POST,
        "/api/v1/billing-forms",
        Some(serde_json::to_value(&form).unwrap()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["id"], json!(ids.form));

    let (status, body) = send(app, Method::GET, &format!("/api/v1/billing-forms/{}", ids.form), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["questions"].as_array().map(Vec::len), Some(3));
}

#[tokio::test]
async fn test_create_billing_form_rejects_foreign_dependency() {
    let (app, _) = test_app().await;
    let (mut form, ids) = sample_billing_form();
    for question in form.questions.iter_mut().filter(|q| q.id == ids.amount) {
        question.depends_on = Some(QuestionDependency {
            question_id: ids.contrast,
            option_id: ids.extras_first,
        });
    }

    let (status, body) = send(
        app,
        Method::POST,
        "/api/v1/billing-forms",
        Some(serde_json::to_value(&form).unwrap()),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("bad_request"));
}

#[tokio::test]
async fn test_issued_link_opens_the_stored_appointment() {
    let app = create_router(
        AppState::from_config(&TokenConfig::with_secret("clinic-secret")),
        Arc::new(MockHealthService::new()),
    );

    let (status, body) = send(
        app.clone(),
        Method::PUT,
        "/api/v1/tables/appointments/apt-9",
        Some(json!({"examination_id": "exam-4", "status": "scheduled"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["row"]["id"], json!("apt-9"));

    let (status, link) = send(app.clone(), Method::POST, "/api/v1/appointments/apt-9/form-link", None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(link["examination_id"], json!("exam-4"));
    let token = link["token"].as_str().unwrap().to_string();

    let (status, body) = send(
        app,
        Method::POST,
        "/functions/v1/get-table-by-token",
        Some(json!({"token": token, "table_name": "appointments"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], json!("scheduled"));
}

#[tokio::test]
async fn test_form_link_errors() {
    let (app, _) = test_app().await;
    let (status, body) = send(app.clone(), Method::POST, "/api/v1/appointments/apt-404/form-link", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], json!("not_found"));

    let (status, _) = send(
        app,
        Method::PUT,
        "/api/v1/tables/billing_answers/x",
        Some(json!({"question_id": "q"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let unsigned = create_router(AppState::from_config(&TokenConfig::default()), Arc::new(MockHealthService::new()));
    send(
        unsigned.clone(),
        Method::PUT,
        "/api/v1/tables/appointments/apt-9",
        Some(json!({"examination_id": "exam-4"})),
    )
    .await;
    let (status, body) = send(unsigned, Method::POST, "/api/v1/appointments/apt-9/form-link", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], json!("internal_error"));
}
