// Testing utilities and mock implementations for the domain layer
// This module is only available when the "mock" feature is enabled

// Re-export useful test mocks from the data layer
pub use radiology_data::repository::tests::{MockBillingRepository, MockTableRepository};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::auth::token::TokenError;
use crate::auth::validator::{TokenValidationError, TokenValidatorTrait};
use crate::entities::billing::{BillingForm, BillingOption, BillingQuestion, QuestionDependency, QuestionType};
use crate::entities::token::TokenClaims;
use crate::health::{ComponentStatus, HealthComponent, HealthServiceTrait, SystemHealth, SystemStatus};
use crate::services::billing::{BillingService, BillingServiceRef};

/// Mock token validator with a fixed set of known tokens
#[derive(Debug, Default, Clone)]
pub struct MockTokenValidator {
    tokens: HashMap<String, TokenClaims>,
    failure: Option<TokenValidationError>,
}

impl MockTokenValidator {
    /// Create a validator that knows no tokens
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `token` for the given appointment
    pub fn with_token(mut self, token: &str, appointment_id: &str, examination_id: &str) -> Self {
        self.tokens.insert(
            token.to_string(),
            TokenClaims {
                appointment_id: appointment_id.to_string(),
                examination_id: examination_id.to_string(),
            },
        );
        self
    }

    /// Fail every validation with `error`
    pub fn failing_with(mut self, error: TokenValidationError) -> Self {
        self.failure = Some(error);
        self
    }
}

#[async_trait]
impl TokenValidatorTrait for MockTokenValidator {
    async fn validate(&self, token: &str) -> Result<TokenClaims, TokenValidationError> {
        if let Some(ref failure) = self.failure {
            return Err(failure.clone());
        }
        self.tokens
            .get(token)
            .cloned()
            .ok_or(TokenValidationError::Token(TokenError::InvalidSignature))
    }
}

/// Mock implementation of health services for testing system health
#[derive(Debug)]
pub struct MockHealthService {
    /// Database component status
    database_status: ComponentStatus,
    /// Additional components
    components: HashMap<String, HealthComponent>,
}

impl Default for MockHealthService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHealthService {
    /// Create a new mock health service with all components healthy
    pub fn new() -> Self {
        Self {
            database_status: ComponentStatus::Healthy,
            components: HashMap::new(),
        }
    }

    /// Configure the mock with a degraded database
    pub fn with_degraded_database(mut self) -> Self {
        self.database_status = ComponentStatus::Degraded;
        self
    }

    /// Configure the mock with an unhealthy database
    pub fn with_unhealthy_database(mut self) -> Self {
        self.database_status = ComponentStatus::Unhealthy;
        self
    }

    /// Add a custom component with a specific status
    pub fn with_component(mut self, name: &str, status: ComponentStatus, details: Option<String>) -> Self {
        self.components.insert(name.to_string(), HealthComponent { status, details });
        self
    }
}

#[async_trait]
impl HealthServiceTrait for MockHealthService {
    async fn get_system_health(&self) -> SystemHealth {
        let mut components = self.components.clone();

        components.insert(
            "database".to_string(),
            HealthComponent {
                status: self.database_status.clone(),
                details: match self.database_status {
                    ComponentStatus::Healthy => None,
                    ComponentStatus::Degraded => Some("Serving from in-memory storage".to_string()),
                    ComponentStatus::Unhealthy => Some("Database connection failed".to_string()),
                },
            },
        );
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
        match self.database_status {
            ComponentStatus::Healthy => Ok(true),
            ComponentStatus::Degraded => Ok(false),
            ComponentStatus::Unhealthy => Err("Database connection failed".to_string()),
        }
    }
}

/// Ids of the questions and options in [`sample_billing_form`]
#[derive(Debug, Clone, Copy)]
pub struct SampleFormIds {
    pub form: Uuid,
    /// "Kontrastmittel?" (yes/no, required)
    pub contrast: Uuid,
    pub contrast_ja: Uuid,
    pub contrast_nein: Uuid,
    /// "Menge in ml" (number, required, shown for contrast = Ja)
    pub amount: Uuid,
    /// "Zusatzleistungen" (multiple choice)
    pub extras: Uuid,
    pub extras_first: Uuid,
    pub extras_second: Uuid,
}

/// A small billing form with one dependent question
pub fn sample_billing_form() -> (BillingForm, SampleFormIds) {
    let form_id = Uuid::new_v4();
    let question = |position: i64, text: &str, question_type: QuestionType, required: bool| BillingQuestion {
        id: Uuid::new_v4(),
        form_id,
        text: text.to_string(),
        question_type,
        required,
        position,
        depends_on: None,
    };
    let option = |question_id: Uuid, label: &str, position: i64| BillingOption {
        id: Uuid::new_v4(),
        question_id,
        label: label.to_string(),
        position,
    };

    let contrast = question(1, "Kontrastmittel?", QuestionType::YesNo, true);
    let ja = option(contrast.id, "Ja", 1);
    let nein = option(contrast.id, "Nein", 2);
    let mut amount = question(2, "Menge in ml", QuestionType::Number, true);
    amount.depends_on = Some(QuestionDependency {
        question_id: contrast.id,
        option_id: ja.id,
    });
    let extras = question(3, "Zusatzleistungen", QuestionType::MultipleChoice, false);
    let first = option(extras.id, "GOÄ 5731", 1);
    let second = option(extras.id, "GOÄ 5733", 2);

    let ids = SampleFormIds {
        form: form_id,
        contrast: contrast.id,
        contrast_ja: ja.id,
        contrast_nein: nein.id,
        amount: amount.id,
        extras: extras.id,
        extras_first: first.id,
        extras_second: second.id,
    };

    let form = BillingForm {
        id: form_id,
        examination_id: Some("mrt-knie".to_string()),
        name: "MRT Knie".to_string(),
        created_at: Utc::now(),
        questions: vec![contrast, amount, extras],
        options: vec![ja, nein, first, second],
    };
    (form, ids)
}

/// Billing service over an in-memory mock repository
pub fn create_mock_billing_service(repository: MockBillingRepository) -> BillingServiceRef {
    Arc::new(BillingService::new(repository))
}

/// Factory function to create a mock health service
pub fn create_mock_health_service() -> impl HealthServiceTrait {
    MockHealthService::new()
}
