//! Error handling module for the rap rounds service.
//!
//! Provides centralized error types with mapping to HTTP status codes and response envelopes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Error codes as constants to avoid stringly-typed errors.
pub mod codes {
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const INVALID_INPUT: &str = "INVALID_INPUT";
    pub const BUDGET_EXCEEDED: &str = "BUDGET_EXCEEDED";
    pub const DUPLICATE_VOTE: &str = "DUPLICATE_VOTE";
    pub const ROUND_CLOSED: &str = "ROUND_CLOSED";
    pub const TRANSIENT_ERROR: &str = "TRANSIENT_ERROR";
    pub const DATABASE_ERROR: &str = "DATABASE_ERROR";
    pub const BAD_REQUEST: &str = "BAD_REQUEST";
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    /// No active round, or the referenced round/word does not exist
    NotFound(String),
    /// Empty or malformed input
    InvalidInput(String),
    /// Adding the word would exceed the round's character limit
    BudgetExceeded { remaining: usize, requested: usize },
    /// The voter already voted for this target
    DuplicateVote(String),
    /// The round no longer accepts words or word votes
    RoundClosed(String),
    /// Store connectivity problem; the request may be retried
    Transient(String),
    /// Non-retryable database error
    Database(String),
    /// Bad request
    BadRequest(String),
}

impl AppError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::BudgetExceeded { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::DuplicateVote(_) => StatusCode::CONFLICT,
            AppError::RoundClosed(_) => StatusCode::CONFLICT,
            AppError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => codes::NOT_FOUND,
            AppError::InvalidInput(_) => codes::INVALID_INPUT,
            AppError::BudgetExceeded { .. } => codes::BUDGET_EXCEEDED,
            AppError::DuplicateVote(_) => codes::DUPLICATE_VOTE,
            AppError::RoundClosed(_) => codes::ROUND_CLOSED,
            AppError::Transient(_) => codes::TRANSIENT_ERROR,
            AppError::Database(_) => codes::DATABASE_ERROR,
            AppError::BadRequest(_) => codes::BAD_REQUEST,
        }
    }

    /// Get the user-facing error message.
    pub fn message(&self) -> String {
        match self {
            AppError::BudgetExceeded {
                remaining,
                requested,
            } => format!(
                "Adding this word would exceed the character limit ({} characters requested, {} remaining)",
                requested, remaining
            ),
            AppError::NotFound(msg)
            | AppError::InvalidInput(msg)
            | AppError::DuplicateVote(msg)
            | AppError::RoundClosed(msg)
            | AppError::Transient(msg)
            | AppError::Database(msg)
            | AppError::BadRequest(msg) => msg.clone(),
        }
    }

    /// Whether the store client may retry the failed operation.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Transient(_))
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_code(), self.message())
    }
}

impl std::error::Error for AppError {}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if is_transient_sqlx(&err) {
            tracing::warn!("Transient store error: {:?}", err);
            return AppError::Transient(format!("Store temporarily unavailable: {}", err));
        }
        tracing::error!("Database error: {:?}", err);
        AppError::Database(format!("Database error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("JSON error: {:?}", err);
        AppError::Database(format!("Malformed stored document: {}", err))
    }
}

/// SQLite result codes for a locked or busy database.
const SQLITE_BUSY: &str = "5";
const SQLITE_LOCKED: &str = "6";

fn is_transient_sqlx(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => true,
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| {
            // Extended codes (517 = SQLITE_BUSY_SNAPSHOT) keep the primary code in the low byte
            let primary = code
                .parse::<i32>()
                .map(|c| (c & 0xff).to_string())
                .unwrap_or_else(|_| code.to_string());
            primary == SQLITE_BUSY || primary == SQLITE_LOCKED
        }),
        _ => false,
    }
}

/// Error details in the response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
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
        let details = match error {
            AppError::BudgetExceeded {
                remaining,
                requested,
            } => Some(serde_json::json!({ "remaining": remaining, "requested": requested })),
            AppError::Transient(_) => Some(serde_json::json!({ "retryable": true })),
            _ => None,
        };

        Self {
            success: false,
            error: ErrorDetails {
                code: error.error_code().to_string(),
                message: error.message(),
                details,
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
