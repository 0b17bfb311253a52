//! Error types for the Cloud API.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use vela_core::CoreError;

use crate::settlement::SettlementError;

/// Cloud API errors.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Insufficient stock for {code}: available {available}, requested {requested}")]
    InsufficientStock {
        code: String,
        available: i64,
        requested: i64,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Database(err.to_string())
    }
}

impl From<SettlementError> for ApiError {
    fn from(err: SettlementError) -> Self {
        match err {
            SettlementError::Core(CoreError::InsufficientStock {
                code,
                available,
                requested,
            }) => ApiError::InsufficientStock {
                code,
                available,
                requested,
            },
            SettlementError::Core(CoreError::ProductNotFound(id)) => {
                ApiError::NotFound(format!("product {id}"))
            }
            SettlementError::Core(CoreError::CustomerNotFound(id)) => {
                ApiError::NotFound(format!("customer {id}"))
            }
            SettlementError::Core(core) => ApiError::Validation(core.to_string()),
            SettlementError::Duplicate(local_id) => {
                // Handlers that care resolve the existing sale themselves;
                // anything that falls through is a conflict-shaped 422.
                ApiError::Validation(format!("sale already recorded for local id {local_id}"))
            }
            SettlementError::Database(msg) => ApiError::Database(msg),
        }
    }
}

/// JSON error envelope returned to clients.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
            ApiError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            ApiError::InsufficientStock { .. } => (StatusCode::CONFLICT, "INSUFFICIENT_STOCK"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code,
                message: self.to_string(),
            },
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settlement_error_mapping() {
        let err: ApiError = SettlementError::Core(CoreError::InsufficientStock {
            code: "RB-1KG".into(),
            available: 1,
            requested: 3,
        })
        .into();
        assert!(matches!(err, ApiError::InsufficientStock { .. }));
    }
}
