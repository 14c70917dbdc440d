//! Error types for Shelfdesk server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Stable numeric error codes returned to the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Failure = 1,
    NotAuthorized = 2,
    DbFailure = 3,
    NotFound = 4,
    BadValue = 5,
    Duplicate = 6,
    ReserverHoldsBook = 7,
    BookNotResolved = 8,
    PartialUpdate = 9,
    InvalidTransition = 10,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// The reserver already holds a confirmed reservation; the caller may retry with `force`
    #[error("{reserver_name} already has a confirmed reservation for \"{held_book}\"")]
    ReserverConflict {
        reserver_name: String,
        held_book: String,
    },

    /// A book could not be resolved from a reservation's serial number
    #[error("Book lookup failed: {0}")]
    Lookup(String),

    /// Reservation and book writes diverged and need manual reconciliation
    #[error("Partial failure: {0}")]
    PartialFailure(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Business rule violation: {0}")]
    BusinessRule(String),
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, ErrorCode) {
        match self {
            AppError::Authentication(_) => (StatusCode::UNAUTHORIZED, ErrorCode::NotAuthorized),
            AppError::Authorization(_) => (StatusCode::FORBIDDEN, ErrorCode::NotAuthorized),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, ErrorCode::NotFound),
            AppError::Validation(_) | AppError::BadRequest(_) => {
                (StatusCode::BAD_REQUEST, ErrorCode::BadValue)
            }
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::DbFailure),
            AppError::Conflict(_) => (StatusCode::CONFLICT, ErrorCode::Duplicate),
            AppError::ReserverConflict { .. } => {
                (StatusCode::CONFLICT, ErrorCode::ReserverHoldsBook)
            }
            AppError::Lookup(_) => (StatusCode::UNPROCESSABLE_ENTITY, ErrorCode::BookNotResolved),
            AppError::PartialFailure(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::PartialUpdate)
            }
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::Failure),
            AppError::BusinessRule(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, ErrorCode::InvalidTransition)
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                "Database error".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
            // Operators need the full text to reconcile by hand
            AppError::PartialFailure(msg) => msg.clone(),
            AppError::ReserverConflict { .. } => self.to_string(),
            AppError::Authentication(msg)
            | AppError::Authorization(msg)
            | AppError::NotFound(msg)
            | AppError::Validation(msg)
            | AppError::Conflict(msg)
            | AppError::Lookup(msg)
            | AppError::BadRequest(msg)
            | AppError::BusinessRule(msg) => msg.clone(),
        };

        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserver_conflict_message_names_reserver_and_book() {
        let err = AppError::ReserverConflict {
            reserver_name: "Asha Rao".to_string(),
            held_book: "Signals and Systems".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("Asha Rao"));
        assert!(text.contains("Signals and Systems"));
    }

    #[test]
    fn test_status_mapping() {
        let conflict = AppError::ReserverConflict {
            reserver_name: "a".to_string(),
            held_book: "b".to_string(),
        };
        assert_eq!(conflict.into_response().status(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::Lookup("x".to_string()).into_response().status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::PartialFailure("x".to_string()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::Validation("x".to_string()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
    }
}
