use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

/// Error structure returned to HTTP clients by the out-of-scope routing layer.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Conflict")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

/// Reasons a promocode is refused at checkout.
///
/// The ordering of the checks producing these is fixed: existence, active
/// flag, validity window, minimum amount, global cap, per-user cap.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize)]
pub enum PromocodeRejection {
    #[error("Promocode not found")]
    NotFound,

    #[error("Promocode is not active")]
    Inactive,

    #[error("Promocode becomes valid on {0}")]
    NotYetValid(DateTime<Utc>),

    #[error("Promocode has expired")]
    Expired,

    #[error("Minimum order amount for this promocode is {0}")]
    BelowMinimum(Decimal),

    #[error("Promocode usage limit has been reached")]
    GloballyExhausted,

    #[error("You have already used this promocode the maximum number of times")]
    PerUserExhausted,

    #[error("Sign-in is required to use this promocode")]
    RequiresAuthentication,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Invalid status transition: {0}")]
    InvalidStatusTransition(String),

    #[error("Promocode rejected: {0}")]
    PromocodeRejected(#[from] PromocodeRejection),

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("Insufficient loyalty balance: {0}")]
    InsufficientBalance(String),

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(Uuid),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) | Self::InvalidOperation(_) => StatusCode::BAD_REQUEST,
            Self::InvalidStatusTransition(_) => StatusCode::CONFLICT,
            Self::PromocodeRejected(rejection) => match rejection {
                PromocodeRejection::NotFound => StatusCode::NOT_FOUND,
                PromocodeRejection::RequiresAuthentication => StatusCode::UNAUTHORIZED,
                PromocodeRejection::GloballyExhausted | PromocodeRejection::PerUserExhausted => {
                    StatusCode::CONFLICT
                }
                _ => StatusCode::UNPROCESSABLE_ENTITY,
            },
            Self::InsufficientStock(_) | Self::InsufficientBalance(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::Conflict(_) | Self::ConcurrentModification(_) => StatusCode::CONFLICT,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::ExternalServiceError(_) => StatusCode::BAD_GATEWAY,
            Self::EventError(_) | Self::InternalError(_) | Self::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::EventError(_) | Self::InternalError(_) | Self::Other(_) => {
                "Internal server error".to_string()
            }
            Self::ConcurrentModification(id) => {
                format!("Concurrent modification for ID {}", id)
            }
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_message = self.response_message();

        let body = Json(json!(ErrorResponse {
            error: status
                .canonical_reason()
                .unwrap_or("Unknown Error")
                .to_string(),
            message: error_message,
            timestamp: Utc::now().to_rfc3339(),
        }));

        (status, body).into_response()
    }
}
