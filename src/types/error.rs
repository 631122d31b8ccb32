//! Error types for Gatehouse
//!
//! Every failure in the request pipeline is one of these kinds. Each kind maps
//! to exactly one HTTP status and one stable public message; storage and
//! internal detail stays in the logs.

use hyper::StatusCode;
use std::collections::BTreeMap;

/// Field name -> human readable problem, as returned to clients on 422
pub type FieldErrors = BTreeMap<String, String>;

const SERVER_ERROR_MESSAGE: &str =
    "the server encountered a problem and could not process your request";

/// Main error type for Gatehouse operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatehouseError {
    #[error("Validation failed: {0:?}")]
    Validation(FieldErrors),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Invalid authentication credentials")]
    InvalidCredentials,

    /// Missing, malformed, unknown or expired bearer token
    #[error("Invalid or missing authentication token")]
    Authentication,

    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("Account not activated")]
    InactiveAccount,

    #[error("Permission not granted")]
    NotPermitted,

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Edit conflict")]
    EditConflict,

    #[error("Record not found")]
    NotFound,

    #[error("Duplicate email")]
    DuplicateEmail,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl GatehouseError {
    /// Build a validation error for a single field
    pub fn field(field: &str, message: &str) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), message.to_string());
        Self::Validation(errors)
    }

    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::Authentication => StatusCode::UNAUTHORIZED,
            Self::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            Self::InactiveAccount => StatusCode::FORBIDDEN,
            Self::NotPermitted => StatusCode::FORBIDDEN,
            Self::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            Self::EditConflict => StatusCode::CONFLICT,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::DuplicateEmail => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the caller
    pub fn public_message(&self) -> serde_json::Value {
        use serde_json::json;
        match self {
            Self::Validation(errors) => json!(errors),
            Self::BadRequest(msg) => json!(msg),
            Self::InvalidCredentials => json!("invalid authentication credentials"),
            Self::Authentication => json!("invalid or missing authentication token"),
            Self::AuthenticationRequired => {
                json!("you must be authenticated to access this resource")
            }
            Self::InactiveAccount => {
                json!("your user account must be activated to access this resource")
            }
            Self::NotPermitted => {
                json!("your user account doesn't have the necessary permissions to access this resource")
            }
            Self::RateLimitExceeded => json!("rate limit exceeded"),
            Self::EditConflict => {
                json!("unable to update the record due to an edit conflict, please try again")
            }
            Self::NotFound => json!("the requested resource could not be found"),
            Self::DuplicateEmail => json!({ "email": "a user with this email address already exists" }),
            Self::Storage(_) | Self::Internal(_) | Self::Config(_) => json!(SERVER_ERROR_MESSAGE),
        }
    }

    /// Whether the response must carry a `WWW-Authenticate` challenge
    pub fn requires_challenge(&self) -> bool {
        matches!(self, Self::Authentication | Self::AuthenticationRequired)
    }

    /// Faults that are logged server side rather than blamed on the caller
    pub fn is_server_fault(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Internal(_) | Self::Config(_))
    }

    /// Convert to status code and body tuple for HTTP response
    pub fn into_status_code_and_body(self) -> (StatusCode, String) {
        let status = self.status_code();
        let body = serde_json::json!({ "error": self.public_message() });
        (status, body.to_string())
    }
}

impl From<std::io::Error> for GatehouseError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for GatehouseError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("body contains badly-formed JSON: {}", err))
    }
}

impl From<hyper::Error> for GatehouseError {
    fn from(err: hyper::Error) -> Self {
        Self::Internal(format!("HTTP error: {}", err))
    }
}

impl From<mongodb::error::Error> for GatehouseError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Result type alias for Gatehouse operations
pub type Result<T> = std::result::Result<T, GatehouseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_failures_stay_distinct() {
        let kinds = [
            GatehouseError::AuthenticationRequired,
            GatehouseError::InactiveAccount,
            GatehouseError::NotPermitted,
        ];
        let messages: Vec<_> = kinds.iter().map(|k| k.public_message()).collect();
        assert_ne!(messages[0], messages[1]);
        assert_ne!(messages[1], messages[2]);
        assert_eq!(kinds[0].status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(kinds[1].status_code(), StatusCode::FORBIDDEN);
        assert_eq!(kinds[2].status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_internal_detail_not_exposed() {
        let err = GatehouseError::Storage("connection refused to 10.0.0.7:27017".into());
        let (status, body) = err.into_status_code_and_body();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body.contains("10.0.0.7"));
        assert!(body.contains(SERVER_ERROR_MESSAGE));
    }

    #[test]
    fn test_challenge_only_for_authentication() {
        assert!(GatehouseError::Authentication.requires_challenge());
        assert!(GatehouseError::AuthenticationRequired.requires_challenge());
        assert!(!GatehouseError::InvalidCredentials.requires_challenge());
        assert!(!GatehouseError::NotPermitted.requires_challenge());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            GatehouseError::RateLimitExceeded.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(GatehouseError::EditConflict.status_code(), StatusCode::CONFLICT);
        assert_eq!(GatehouseError::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            GatehouseError::field("email", "must be provided").status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}
