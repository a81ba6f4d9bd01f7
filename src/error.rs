use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use derive_more::Display;
use serde_json::json;

use crate::model::{RecordId, ZoneId};

pub type EngineResult<T> = Result<T, EngineError>;
pub type StoreResult<T> = Result<T, StoreError>;

/// Failures reported by a storage backend.
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write (another writer got there first).
    #[display(fmt = "conflicting write")]
    Conflict,
    /// A foreign key rejected the write: the row is still referenced, or
    /// the row it points at is gone.
    #[display(fmt = "foreign key violation")]
    Referenced,
    #[display(fmt = "storage unavailable: {}", _0)]
    Unavailable(String),
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &e {
            if db_err.is_unique_violation() {
                return StoreError::Conflict;
            }
            if db_err.is_foreign_key_violation() {
                return StoreError::Referenced;
            }
        }
        StoreError::Unavailable(e.to_string())
    }
}

/// Everything the zone/attendance engine can answer with besides success.
#[derive(Debug, Display, Clone, PartialEq)]
pub enum EngineError {
    #[display(fmt = "validation failed: {}", _0)]
    Validation(String),
    #[display(fmt = "You are not inside a registered zone")]
    OutsideAnyZone,
    #[display(fmt = "Already checked in")]
    AlreadyCheckedIn,
    #[display(fmt = "No open check-in found")]
    NotCheckedIn,
    #[display(fmt = "Concurrent update detected, retry once")]
    ConcurrencyConflict,
    #[display(fmt = "zone {} not found", _0)]
    ZoneNotFound(ZoneId),
    #[display(fmt = "attendance record {} not found", _0)]
    RecordNotFound(RecordId),
    #[display(fmt = "{}", _0)]
    Unauthorized(&'static str),
    #[display(fmt = "{}", _0)]
    Forbidden(&'static str),
    #[display(fmt = "{}", _0)]
    Storage(StoreError),
    #[display(fmt = "internal error: {}", _0)]
    Internal(String),
}

impl std::error::Error for EngineError {}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        EngineError::Storage(e)
    }
}

impl EngineError {
    pub fn validation(message: impl Into<String>) -> Self {
        EngineError::Validation(message.into())
    }

    /// Stable machine-readable code for callers that map errors to UI messages.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "VALIDATION_ERROR",
            EngineError::OutsideAnyZone => "OUTSIDE_ANY_ZONE",
            EngineError::AlreadyCheckedIn => "ALREADY_CHECKED_IN",
            EngineError::NotCheckedIn => "NOT_CHECKED_IN",
            EngineError::ConcurrencyConflict => "CONCURRENCY_CONFLICT",
            EngineError::ZoneNotFound(_) => "ZONE_NOT_FOUND",
            EngineError::RecordNotFound(_) => "RECORD_NOT_FOUND",
            EngineError::Unauthorized(_) => "UNAUTHORIZED",
            EngineError::Forbidden(_) => "FORBIDDEN",
            EngineError::Storage(_) => "STORAGE_UNAVAILABLE",
            EngineError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl ResponseError for EngineError {
    fn status_code(&self) -> StatusCode {
        match self {
            EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            EngineError::OutsideAnyZone => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::AlreadyCheckedIn
            | EngineError::NotCheckedIn
            | EngineError::ConcurrencyConflict => StatusCode::CONFLICT,
            EngineError::ZoneNotFound(_) | EngineError::RecordNotFound(_) => StatusCode::NOT_FOUND,
            EngineError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            EngineError::Forbidden(_) => StatusCode::FORBIDDEN,
            EngineError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            // storage details stay in the logs
            EngineError::Storage(_) | EngineError::Internal(_) => {
                tracing::error!(error = %self, "Request failed");
                "Internal Server Error".to_string()
            }
            other => other.to_string(),
        };

        HttpResponse::build(self.status_code()).json(json!({
            "error": self.code(),
            "message": message,
        }))
    }
}
