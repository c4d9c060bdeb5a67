//! Error handling for the Gamestash backend
//!
//! Centralized error management providing consistent error types, HTTP status
//! code mapping, and automatic error logging. Component functions return
//! tagged `AppResult` values rather than panicking across the API boundary;
//! storage failures are logged in full and surfaced as a generic message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;
use tracing::error;

/// Comprehensive error type covering all platform operations
#[derive(Debug)]
pub enum AppError {
    /// Underlying query/connection failures; detail stays in the logs
    Database(anyhow::Error),
    /// Actor identity missing or insufficient where required
    Auth(String),
    /// Malformed or out-of-range request input
    Validation(String),
    /// Duplicate-insert races (e.g. concurrent like toggles)
    Conflict(String),
    /// Payment webhook rejection (bad signature, unknown event)
    Payment(String),
    /// Referenced product/user/sale does not exist
    NotFound(String),
    /// Configuration errors
    Config(String),
    /// Internal server errors
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Database(err) => write!(f, "Database error: {}", err),
            AppError::Auth(msg) => write!(f, "Authentication error: {}", msg),
            AppError::Validation(msg) => write!(f, "Validation error: {}", msg),
            AppError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            AppError::Payment(msg) => write!(f, "Payment error: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

/// Converts application errors to proper HTTP responses with status codes
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, error_code) = match &self {
            AppError::Database(_) => {
                error!("Database error: {}", self);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string(), "DATABASE_ERROR")
            }
            AppError::Auth(msg) => {
                (StatusCode::UNAUTHORIZED, msg.clone(), "AUTH_ERROR")
            }
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, msg.clone(), "VALIDATION_ERROR")
            }
            AppError::Conflict(msg) => {
                (StatusCode::CONFLICT, msg.clone(), "CONFLICT")
            }
            AppError::Payment(msg) => {
                (StatusCode::BAD_REQUEST, msg.clone(), "PAYMENT_ERROR")
            }
            AppError::NotFound(msg) => {
                (StatusCode::NOT_FOUND, msg.clone(), "NOT_FOUND")
            }
            AppError::Config(msg) => {
                error!("Configuration error: {}", self);
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone(), "CONFIG_ERROR")
            }
            AppError::Internal(msg) => {
                error!("Internal error: {}", self);
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone(), "INTERNAL_ERROR")
            }
        };

        let body = Json(json!({
            "success": false,
            "error": {
                "code": error_code,
                "message": error_message
            },
            "timestamp": chrono::Utc::now()
        }));

        (status, body).into_response()
    }
}

/// Convenient result type for all application operations
pub type AppResult<T> = Result<T, AppError>;

/// Converts generic anyhow errors to application errors
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Database(err)
    }
}

/// Converts database errors to application errors
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(anyhow::Error::from(err))
    }
}

/// Converts JSON serialization errors to application errors
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Validation(format!("JSON parsing error: {}", err))
    }
}

/// Convenient macro for creating authentication errors
#[macro_export]
macro_rules! auth_error {
    ($msg:expr) => {
        $crate::error::AppError::Auth($msg.to_string())
    };
}

/// Convenient macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($msg:expr) => {
        $crate::error::AppError::Validation($msg.to_string())
    };
}

/// Convenient macro for creating not found errors
#[macro_export]
macro_rules! not_found_error {
    ($msg:expr) => {
        $crate::error::AppError::NotFound($msg.to_string())
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    /// Tests that each error variant maps to its expected HTTP status
    #[test]
    fn test_status_mapping() {
        let cases = vec![
            (AppError::Auth("nope".into()), StatusCode::UNAUTHORIZED),
            (AppError::NotFound("missing".into()), StatusCode::NOT_FOUND),
            (AppError::Conflict("dup".into()), StatusCode::CONFLICT),
            (AppError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (AppError::Payment("sig".into()), StatusCode::BAD_REQUEST),
            (
                AppError::Database(anyhow::anyhow!("down")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    /// Tests that storage failures never leak internal detail to callers
    #[test]
    fn test_database_error_message_is_generic() {
        let err = AppError::Database(anyhow::anyhow!("connection refused at 10.0.0.1:5432"));
        let display = err.to_string();
        assert!(display.contains("connection refused"));
        // The HTTP body is built in into_response; the displayed detail
        // is only ever written to the log.
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
