use crate::{
    db::errors::DbError,
    types::{Operation, Permission},
};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

pub type Result<T> = std::result::Result<T, Error>;

/// API-facing error taxonomy. Every variant maps to one status code and one
/// stable `error` tag so callers can branch on the failure kind instead of
/// parsing message text.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{message}")]
    BadRequest { message: String },

    #[error("Authentication required: {message}")]
    Unauthorized { message: String },

    #[error("Insufficient permissions: {action} on {resource} requires {required:?}")]
    InsufficientPermissions {
        required: Permission,
        action: Operation,
        resource: String,
    },

    #[error("Not the owner of {resource} {id}")]
    NotOwner { resource: String, id: String },

    #[error("{resource} {id} not found")]
    NotFound { resource: String, id: String },

    #[error("Review {id} is not pending (current status: {status})")]
    NotPending { id: String, status: String },

    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    #[error("Insufficient points: required {required}, available {available}")]
    InsufficientFunds { required: i64, available: i64 },

    #[error("No active pricing entry for work type '{work_type}'")]
    PricingNotConfigured { work_type: String },

    #[error("Required system setting '{key}' is missing")]
    ConfigMissing { key: String },

    /// Ledger invariant broken (e.g. pending-bucket underflow). Never
    /// recoverable by the caller; the surrounding transaction is rolled back.
    #[error("Ledger invariant violated: {message}")]
    InvariantViolation { message: String },

    #[error("Database error: {0}")]
    Database(DbError),
}

impl Error {
    /// Stable machine-readable tag, serialized in the error body.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::BadRequest { .. } => "invalid_input",
            Error::Unauthorized { .. } => "unauthorized",
            Error::InsufficientPermissions { .. } => "forbidden",
            Error::NotOwner { .. } => "not_owner",
            Error::NotFound { .. } => "not_found",
            Error::NotPending { .. } => "not_pending",
            Error::InvalidState { .. } => "invalid_state",
            Error::InsufficientFunds { .. } => "insufficient_funds",
            Error::PricingNotConfigured { .. } => "pricing_not_configured",
            Error::ConfigMissing { .. } => "config_missing",
            Error::InvariantViolation { .. } => "invariant_violation",
            Error::Database(_) => "database_error",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Error::InsufficientPermissions { .. } | Error::NotOwner { .. } => StatusCode::FORBIDDEN,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::NotPending { .. } | Error::InvalidState { .. } | Error::InsufficientFunds { .. } => StatusCode::CONFLICT,
            Error::PricingNotConfigured { .. }
            | Error::ConfigMissing { .. }
            | Error::InvariantViolation { .. }
            | Error::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DbError> for Error {
    fn from(e: DbError) -> Self {
        match e {
            // Every ledger path validates before writing, so a balance CHECK
            // firing at the database means a code path missed its guard.
            DbError::CheckViolation { constraint }
                if constraint.contains("available_points") || constraint.contains("pending_points") =>
            {
                Error::InvariantViolation {
                    message: format!("balance check constraint fired: {constraint}"),
                }
            }
            other => Error::Database(other),
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::from(DbError::from(e))
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(kind = self.kind(), "{self}");
        }
        let body = Json(json!({
            "error": self.kind(),
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}
