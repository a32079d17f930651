use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::normalize::QuantityError;
use crate::photos::PhotoError;

/// Errors surfaced by the count pipeline. Every variant carries a message
/// that is returned to the caller as-is.
#[derive(Error, Debug)]
pub enum AppError {
    /// Missing, malformed or expired credential
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Valid credential without the warehouse or role scope
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Precondition not met (closed event, empty worker pool)
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input; the whole submission or batch is rejected
    #[error("Validation error: {0}")]
    Validation(String),

    /// Blob storage failure; retryable
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::Conflict(_) => "conflict",
            AppError::NotFound(_) => "not_found",
            AppError::Validation(_) => "validation",
            AppError::Storage(_) => "storage_error",
            AppError::Database(_) => "database_error",
            AppError::Config(_) | AppError::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) | AppError::NotFound(_) | AppError::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(_) | AppError::Config(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    ok: bool,
    code: &'a str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("{}", self);
        } else {
            log::debug!("request rejected: {}", self);
        }

        let body = ErrorBody {
            ok: false,
            code: self.code(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<QuantityError> for AppError {
    fn from(e: QuantityError) -> Self {
        AppError::Validation(e.to_string())
    }
}

impl From<PhotoError> for AppError {
    fn from(e: PhotoError) -> Self {
        AppError::Storage(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_rule_failures_map_to_bad_request() {
        assert_eq!(AppError::Conflict("closed".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Validation("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::NotFound("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Unauthorized("x".into()).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Storage("x".into()).code(), "storage_error");
    }
}
