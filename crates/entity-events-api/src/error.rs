//! Entity events API: error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use entity_events_core::error::EventError;
use serde::Serialize;
use thiserror::Error;

/// Startup and runtime errors for the API server.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required environment variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Database connection or pool error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failed.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Network binding or I/O error.
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

/// JSON body returned for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: &'static str,
    /// Human-readable error message.
    pub message: String,
}

/// HTTP-layer wrapper around `EventError` that implements `IntoResponse`.
#[derive(Debug)]
pub struct ApiError(pub EventError);

impl From<EventError> for ApiError {
    fn from(err: EventError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self.0 {
            EventError::EventNotFound(_) => (StatusCode::NOT_FOUND, "event_not_found"),
            EventError::ProcessorNotFound(_) => (StatusCode::NOT_FOUND, "processor_not_found"),
            EventError::DuplicateProcessor(_) => (StatusCode::CONFLICT, "duplicate_processor"),
            EventError::StateConflict { .. } => (StatusCode::CONFLICT, "state_conflict"),
            EventError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            EventError::Serialization(_) => (StatusCode::BAD_REQUEST, "serialization_error"),
            EventError::ContentDeleted { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "content_deleted")
            }
            EventError::UnknownOwnerType(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "unknown_owner_type")
            }
            EventError::ChainFault { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "chain_fault"),
            EventError::Infrastructure(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "infrastructure_error")
            }
        };

        let body = ErrorBody {
            error: error_code,
            message: self.0.to_string(),
        };

        (status, Json(body)).into_response()
    }
}
