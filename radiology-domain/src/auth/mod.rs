//! Signed form-link tokens
//!
//! Patients receive links carrying `base64(payload).base64(hmac)` tokens.
//! This module issues and verifies them and records access events.

pub mod token;
pub mod validator;
pub mod logging;

pub use token::{TokenError, TokenSigner};
pub use validator::{
    create_validator, LocalTokenValidator, RemoteTokenValidator, TokenValidationError, TokenValidatorTrait,
};
