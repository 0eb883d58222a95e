//! Error handling for the Lead CRM
//!
//! Every failure reaching a handler becomes one JSON shape:
//! `{ "error": { "code", "message", ... } }`. Stock failures carry the extra
//! machine-readable fields the front end uses to tell "not enough stock"
//! apart from "try again later".

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::services::stock::StockError;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Authentication errors
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    // Validation errors
    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Stock errors, optionally after a status change was compensated
    #[error("{error}")]
    Stock {
        error: StockError,
        status_reverted: Option<bool>,
        revert_warning: Option<String>,
    },

    // Ledger store errors
    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Ledger quota exceeded")]
    LedgerQuota,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Too many requests")]
    RateLimited { retry_after_secs: u64 },

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// True for failures of the ledger store itself, which are worth retrying
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Ledger(_) | AppError::LedgerQuota => true,
            AppError::Stock { error, .. } => !error.is_user_actionable(),
            _ => false,
        }
    }
}

impl From<StockError> for AppError {
    fn from(error: StockError) -> Self {
        AppError::Stock {
            error,
            status_reverted: None,
            revert_warning: None,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field = errors
            .field_errors()
            .keys()
            .next()
            .map(|k| k.to_string())
            .unwrap_or_default();
        AppError::Validation {
            field,
            message: errors.to_string(),
        }
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize, Default)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock_error: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_quantity: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_quantity: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_reverted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revert_warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl ErrorDetail {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            ..Default::default()
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let retryable = self.is_retryable();
        let (status, mut error_detail) = match &self {
            AppError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new("INVALID_CREDENTIALS", "Invalid username or password"),
            ),
            AppError::TokenExpired => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new("TOKEN_EXPIRED", "Token has expired"),
            ),
            AppError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new("INVALID_TOKEN", "Invalid token"),
            ),
            AppError::InsufficientPermissions => (
                StatusCode::FORBIDDEN,
                ErrorDetail::new(
                    "INSUFFICIENT_PERMISSIONS",
                    "You do not have permission to perform this action",
                ),
            ),
            AppError::Validation { field, message } => (
                StatusCode::BAD_REQUEST,
                ErrorDetail {
                    field: Some(field.clone()),
                    ..ErrorDetail::new("VALIDATION_ERROR", message.clone())
                },
            ),
            AppError::ValidationError(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("VALIDATION_ERROR", msg.clone()),
            ),
            AppError::DuplicateEntry(field) => (
                StatusCode::CONFLICT,
                ErrorDetail {
                    field: Some(field.clone()),
                    ..ErrorDetail::new(
                        "DUPLICATE_ENTRY",
                        format!("A record with this {} already exists", field),
                    )
                },
            ),
            AppError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                ErrorDetail::new("NOT_FOUND", format!("{} not found", resource)),
            ),
            AppError::Stock {
                error,
                status_reverted,
                revert_warning,
            } => {
                let (status, code) = match error {
                    StockError::ProductNotFound { .. } => {
                        (StatusCode::BAD_REQUEST, "PRODUCT_NOT_FOUND")
                    }
                    StockError::InvalidQuantity(_) => (StatusCode::BAD_REQUEST, "INVALID_QUANTITY"),
                    StockError::InsufficientStock { .. } => {
                        (StatusCode::UNPROCESSABLE_ENTITY, "INSUFFICIENT_STOCK")
                    }
                    StockError::System(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STOCK_SYSTEM_ERROR"),
                };
                let (required, available) = match error {
                    StockError::InsufficientStock {
                        requested,
                        available,
                        ..
                    } => (Some(*requested), Some(*available)),
                    _ => (None, None),
                };
                let mut message = error.to_string();
                if *status_reverted == Some(true) {
                    message.push_str("; the order status was reverted");
                }
                (
                    status,
                    ErrorDetail {
                        stock_error: Some(true),
                        required_quantity: required,
                        available_quantity: available,
                        status_reverted: *status_reverted,
                        revert_warning: revert_warning.clone(),
                        ..ErrorDetail::new(code, message)
                    },
                )
            }
            AppError::Ledger(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new(
                    "LEDGER_ERROR",
                    "The spreadsheet ledger could not be reached. Please retry.",
                ),
            ),
            AppError::LedgerQuota => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorDetail::new(
                    "LEDGER_QUOTA_EXCEEDED",
                    "The spreadsheet ledger is rate limiting requests. Please retry shortly.",
                ),
            ),
            AppError::Configuration(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("CONFIGURATION_ERROR", format!("Configuration error: {}", msg)),
            ),
            AppError::RateLimited { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                ErrorDetail::new("RATE_LIMITED", "Too many requests"),
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("INTERNAL_ERROR", msg.clone()),
            ),
            AppError::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("INTERNAL_ERROR", "An internal server error occurred"),
            ),
        };

        if retryable {
            error_detail.retryable = Some(true);
        }

        if status.is_server_error() {
            tracing::error!("Error: {:?}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }

        let mut response = (status, Json(ErrorResponse { error: error_detail })).into_response();
        if let AppError::RateLimited { retry_after_secs } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;
