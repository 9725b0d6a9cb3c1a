//! Core error kinds for the storage core.
//!
//! Every component (A–K) returns `AppError`, mapped to HTTP status codes
//! per the error kinds: Validation, Auth, Authorization, NotFound,
//! Conflict, Gone, RateLimit, LockTimeout, EngineError, Internal.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type AppResult<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    /// Bad input, malformed path, disallowed where-clause. Non-retryable.
    #[error("{0}")]
    Validation(String),

    /// Missing or bad credential.
    #[error("{0}")]
    Auth(String),

    /// Valid credential, wrong scope/project/branch.
    #[error("{0}")]
    Authorization(String),

    /// Entity missing (non-idempotent contexts only — callers handling
    /// idempotent deletes must special-case NotFound themselves).
    #[error("{0}")]
    NotFound(String),

    /// Already exists, PK violation, already shared.
    #[error("{0}")]
    Conflict(String),

    /// Workspace expired.
    #[error("{0}")]
    Gone(String),

    /// Per-workspace session limit exceeded.
    #[error("{0}")]
    RateLimit(String),

    /// Per-table lock wait exceeded; retry-safe.
    #[error("{0}")]
    LockTimeout(String),

    /// Surfaced unchanged from the embedded engine.
    #[error("engine error: {0}")]
    EngineError(String),

    /// Everything unexpected.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Authorization(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Gone(_) => StatusCode::GONE,
            AppError::RateLimit(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::LockTimeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::EngineError(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::Auth(_) => "auth_error",
            AppError::Authorization(_) => "authorization_error",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::Gone(_) => "gone",
            AppError::RateLimit(_) => "rate_limit_exceeded",
            AppError::LockTimeout(_) => "lock_timeout",
            AppError::EngineError(_) => "engine_error",
            AppError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Internal(msg) => tracing::error!(error = %msg, "internal error"),
            AppError::EngineError(msg) => tracing::warn!(error = %msg, "engine error"),
            _ => {},
        }

        let status = self.status();
        let body = Json(json!({
            "error": self.kind(),
            "message": self.to_string(),
            "details": null,
        }));

        let mut response = (status, body).into_response();
        match status {
            StatusCode::UNAUTHORIZED => {
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            },
            StatusCode::SERVICE_UNAVAILABLE => {
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
            },
            _ => {},
        }
        response
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("record not found".to_string()),
            other => AppError::Internal(format!("database error: {other}")),
        }
    }
}

impl From<crate::db::DbError> for AppError {
    fn from(err: crate::db::DbError) -> Self {
        match err {
            crate::db::DbError::NotFound(msg) => AppError::NotFound(msg),
            crate::db::DbError::Duplicate(msg) => AppError::Conflict(msg),
            crate::db::DbError::Config(msg) => AppError::Internal(msg),
            crate::db::DbError::Sqlx(e) => AppError::from(e),
        }
    }
}

impl From<duckdb::Error> for AppError {
    fn from(err: duckdb::Error) -> Self {
        AppError::EngineError(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(format!("io error: {err}"))
    }
}

impl From<core_common::CoreError> for AppError {
    fn from(err: core_common::CoreError) -> Self {
        AppError::Internal(err.to_string())
    }
}
