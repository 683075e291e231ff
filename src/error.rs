use rust_decimal::Decimal;
use thiserror::Error;

use crate::enums::Currency;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")] Database(#[from] sea_orm::DbErr),

    #[error("Invalid input: {0}")] InvalidInput(String),

    #[error("User {0} not found")] UserNotFound(i64),

    #[error("Insufficient {currency} balance: available {available}, required {required}")]
    InsufficientBalance {
        currency: Currency,
        available: Decimal,
        required: Decimal,
    },

    #[error("Unknown boost package: {0}")] UnknownBoostPackage(i32),

    #[error("Referral rejected: {0}")] ReferralRejected(String),

    #[error("Configuration error: {0}")] Config(String),

    #[error("Internal error: {0}")] Internal(String),
}

impl AppError {
    /// Storage failures are transient and may be retried by the caller.
    /// Everything else fails the same way on every attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Database(_))
    }
}

#[derive(serde::Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(serde::Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl AppError {
    pub fn to_error_response(&self) -> ErrorResponse {
        let (code, message, field) = match self {
            // Storage and internal detail stays in the server logs
            AppError::Database(_) =>
                ("INTERNAL_ERROR", "Internal server error".to_string(), None),
            AppError::InvalidInput(msg) => ("INVALID_INPUT", msg.clone(), None),
            AppError::UserNotFound(_) => ("USER_NOT_FOUND", "User not found".to_string(), None),
            AppError::InsufficientBalance { currency, available, required } =>
                (
                    "INSUFFICIENT_BALANCE",
                    format!(
                        "Insufficient {} balance: {} available, {} required",
                        currency,
                        available,
                        required
                    ),
                    Some("amount".to_string()),
                ),
            AppError::UnknownBoostPackage(id) =>
                (
                    "UNKNOWN_BOOST_PACKAGE",
                    format!("Boost package {} does not exist", id),
                    Some("package_id".to_string()),
                ),
            AppError::ReferralRejected(msg) =>
                ("REFERRAL_REJECTED", msg.clone(), Some("referred_by".to_string())),
            AppError::Config(_) | AppError::Internal(_) =>
                ("INTERNAL_ERROR", "Internal server error".to_string(), None),
        };

        ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                field,
            },
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::UserNotFound(_) => axum::http::StatusCode::NOT_FOUND,
            | AppError::InvalidInput(_)
            | AppError::UnknownBoostPackage(_)
            | AppError::ReferralRejected(_) => {
                axum::http::StatusCode::BAD_REQUEST
            }
            AppError::InsufficientBalance { .. } => axum::http::StatusCode::BAD_REQUEST,
            AppError::Database(_) => axum::http::StatusCode::SERVICE_UNAVAILABLE,
            _ => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let response = self.to_error_response();
        (status, axum::Json(response)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_balance_message_is_specific() {
        let err = AppError::InsufficientBalance {
            currency: Currency::Ton,
            available: Decimal::from(30),
            required: Decimal::from(50),
        };
        let response = err.to_error_response();
        assert_eq!(response.error.code, "INSUFFICIENT_BALANCE");
        assert!(response.error.message.contains("TON"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn storage_errors_are_generic_to_the_user() {
        let err = AppError::Database(sea_orm::DbErr::Custom("connection reset".into()));
        let response = err.to_error_response();
        assert_eq!(response.error.message, "Internal server error");
        assert!(err.is_retryable());
    }
}
