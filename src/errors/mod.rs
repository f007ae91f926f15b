//! Error handling module for the kanban backend.
//!
//! Authorization and existence failures stay distinct variants so callers can
//! tell them apart; the HTTP mapping happens only at the response boundary.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Error codes as constants to avoid stringly-typed errors.
pub mod codes {
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
    pub const FORBIDDEN: &str = "FORBIDDEN";
    pub const UNKNOWN_BOARD: &str = "UNKNOWN_BOARD";
    pub const UNKNOWN_LIST: &str = "UNKNOWN_LIST";
    pub const UNKNOWN_CARD: &str = "UNKNOWN_CARD";
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
    pub const DATABASE_ERROR: &str = "DATABASE_ERROR";
    pub const BAD_REQUEST: &str = "BAD_REQUEST";
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    /// No authenticated identity
    Unauthorized(String),
    /// Authenticated but not allowed on the target board or card
    Forbidden { reason: String },
    /// Board absent from the current snapshot
    UnknownBoard(String),
    /// List absent from the board
    UnknownList(String),
    /// Card absent from the store
    UnknownCard(String),
    /// A named query failed; the name is for diagnostics only
    DatabaseExecution { query: &'static str },
    /// Unnamed store error
    Database(String),
    /// Validation error
    Validation(String),
    /// Internal server error
    Internal(String),
    /// Bad request
    BadRequest(String),
}

impl AppError {
    pub fn forbidden(reason: impl Into<String>) -> Self {
        AppError::Forbidden {
            reason: reason.into(),
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden { .. } => StatusCode::FORBIDDEN,
            AppError::UnknownBoard(_) | AppError::UnknownList(_) | AppError::UnknownCard(_) => {
                StatusCode::NOT_FOUND
            }
            AppError::DatabaseExecution { .. } | AppError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Unauthorized(_) => codes::UNAUTHORIZED,
            AppError::Forbidden { .. } => codes::FORBIDDEN,
            AppError::UnknownBoard(_) => codes::UNKNOWN_BOARD,
            AppError::UnknownList(_) => codes::UNKNOWN_LIST,
            AppError::UnknownCard(_) => codes::UNKNOWN_CARD,
            AppError::DatabaseExecution { .. } | AppError::Database(_) => codes::DATABASE_ERROR,
            AppError::Validation(_) => codes::VALIDATION_ERROR,
            AppError::Internal(_) => codes::INTERNAL_ERROR,
            AppError::BadRequest(_) => codes::BAD_REQUEST,
        }
    }

    /// Get the error message.
    pub fn message(&self) -> String {
        match self {
            AppError::Unauthorized(msg) => msg.clone(),
            AppError::Forbidden { reason } => reason.clone(),
            AppError::UnknownBoard(id) => format!("unknown board: {}", id),
            AppError::UnknownList(id) => format!("unknown list: {}", id),
            AppError::UnknownCard(id) => format!("unknown card: {}", id),
            AppError::DatabaseExecution { .. } => "database query failed".to_string(),
            AppError::Database(msg) => msg.clone(),
            AppError::Validation(msg) => msg.clone(),
            AppError::Internal(msg) => msg.clone(),
            AppError::BadRequest(msg) => msg.clone(),
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::DatabaseExecution { query } => {
                write!(f, "{}: query {} failed", self.error_code(), query)
            }
            _ => write!(f, "{}: {}", self.error_code(), self.message()),
        }
    }
}

impl std::error::Error for AppError {}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        AppError::Database(format!("Database error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("JSON error: {:?}", err);
        AppError::Internal(format!("JSON error: {}", err))
    }
}

/// Extension for naming the query behind a store error.
pub trait QueryContext<T> {
    fn query(self, query: &'static str) -> Result<T, AppError>;
}

impl<T> QueryContext<T> for Result<T, sqlx::Error> {
    fn query(self, query: &'static str) -> Result<T, AppError> {
        self.map_err(|err| {
            tracing::error!(query, "Database query failed: {:?}", err);
            AppError::DatabaseExecution { query }
        })
    }
}

/// Error details in the response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
}

/// Error response envelope.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetails,
    pub revision_id: i64,
}

impl ErrorResponse {
    pub fn new(error: &AppError, revision_id: i64) -> Self {
        Self {
            success: false,
            error: ErrorDetails {
                code: error.error_code().to_string(),
                message: error.message(),
            },
            revision_id,
        }
    }
}

/// Wrapper type for errors that carry revision_id context.
pub struct AppErrorWithRevision {
    pub error: AppError,
    pub revision_id: i64,
}

impl IntoResponse for AppErrorWithRevision {
    fn into_response(self) -> Response {
        let status = self.error.status_code();
        let body = ErrorResponse::new(&self.error, self.revision_id);
        (status, Json(body)).into_response()
    }
}
