//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::{format_money, DomainError};
use crate::idempotency::IdempotencyError;
use crate::store::StoreError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Idempotency conflict: same key with different request")]
    IdempotencyConflict,

    // Domain errors
    #[error(transparent)]
    Domain(#[from] DomainError),

    // Storage errors (409 / 503 / 500)
    #[error(transparent)]
    Store(#[from] StoreError),

    // Server errors (5xx)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<IdempotencyError> for AppError {
    fn from(err: IdempotencyError) -> Self {
        match err {
            IdempotencyError::HashMismatch(_) => AppError::IdempotencyConflict,
            IdempotencyError::Store(e) => AppError::Store(e),
            IdempotencyError::Serialization(e) => AppError::Internal(e.to_string()),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(rename = "currentBalance", skip_serializing_if = "Option::is_none")]
    pub current_balance: Option<String>,
    #[serde(rename = "requiredAmount", skip_serializing_if = "Option::is_none")]
    pub required_amount: Option<String>,
}

impl ErrorResponse {
    fn new(error: String, error_code: &str, details: Option<String>) -> Self {
        Self {
            error,
            error_code: error_code.to_string(),
            details,
            current_balance: None,
            required_amount: None,
        }
    }
}

const INTERNAL_MESSAGE: &str = "Internal server error";

fn domain_response(err: &DomainError) -> (StatusCode, ErrorResponse) {
    let message = err.to_string();
    match err {
        DomainError::InvalidToken(raw) => (
            StatusCode::BAD_REQUEST,
            ErrorResponse::new(message, "invalid_token", Some(raw.clone())),
        ),
        DomainError::InvalidAmount(msg) => (
            StatusCode::BAD_REQUEST,
            ErrorResponse::new(message, "invalid_amount", Some(msg.clone())),
        ),
        DomainError::InsufficientFunds {
            current_balance,
            required_amount,
        } => {
            let mut body = ErrorResponse::new("Insufficient credit".to_string(), "insufficient_funds", None);
            body.current_balance = Some(format_money(*current_balance));
            body.required_amount = Some(format_money(*required_amount));
            (StatusCode::BAD_REQUEST, body)
        }
        DomainError::InsufficientStock { .. } => (
            StatusCode::CONFLICT,
            ErrorResponse::new(message, "insufficient_stock", None),
        ),
        DomainError::EmptyOrder => (
            StatusCode::BAD_REQUEST,
            ErrorResponse::new(message, "empty_order", None),
        ),
        DomainError::InvalidStatus(status) => (
            StatusCode::BAD_REQUEST,
            ErrorResponse::new(message, "invalid_status", Some(status.clone())),
        ),
        DomainError::InvalidTransition { .. } => (
            StatusCode::CONFLICT,
            ErrorResponse::new(message, "invalid_transition", None),
        ),
        DomainError::AccountNotFound(token) => (
            StatusCode::NOT_FOUND,
            ErrorResponse::new(message, "account_not_found", Some(token.clone())),
        ),
        DomainError::ItemNotFound(id) => (
            StatusCode::NOT_FOUND,
            ErrorResponse::new(message, "item_not_found", Some(id.to_string())),
        ),
        DomainError::OrderNotFound(number) => (
            StatusCode::NOT_FOUND,
            ErrorResponse::new(message, "order_not_found", Some(number.clone())),
        ),
        DomainError::Validation(msg) => (
            StatusCode::BAD_REQUEST,
            ErrorResponse::new(message, "validation_error", Some(msg.clone())),
        ),
    }
}

fn store_response(err: &StoreError) -> (StatusCode, ErrorResponse) {
    match err {
        StoreError::Timeout(msg) => {
            tracing::warn!(error = %msg, "Storage timeout");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorResponse::new(
                    "Storage temporarily unavailable, retry later".to_string(),
                    "storage_timeout",
                    None,
                ),
            )
        }
        StoreError::Conflict(msg) => {
            tracing::warn!(error = %msg, "Storage conflict");
            (
                StatusCode::CONFLICT,
                ErrorResponse::new(
                    "Concurrent modification, retry the request".to_string(),
                    "storage_conflict",
                    None,
                ),
            )
        }
        other => {
            tracing::error!("Storage error: {:?}", other);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new(INTERNAL_MESSAGE.to_string(), "storage_error", None),
            )
        }
    }
}

impl AppError {
    /// HTTP status for this error
    pub fn status_code(&self) -> StatusCode {
        self.to_response_parts().0
    }

    fn to_response_parts(&self) -> (StatusCode, ErrorResponse) {
        match self {
            // 400 Bad Request
            AppError::InvalidRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new(self.to_string(), "invalid_request", Some(msg.clone())),
            ),

            // 409 Conflict
            AppError::IdempotencyConflict => (
                StatusCode::CONFLICT,
                ErrorResponse::new(self.to_string(), "idempotency_conflict", None),
            ),

            AppError::Domain(domain_err) => domain_response(domain_err),
            AppError::Store(store_err) => store_response(store_err),

            // 500 Internal Server Error
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new(INTERNAL_MESSAGE.to_string(), "internal_error", None),
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = self.to_response_parts();
        (status, Json(body)).into_response()
    }
}
