//! Error types for the classroom API.
//!
//! Every failure a handler can hit funnels into [`AppError`], which decides
//! the HTTP status and renders the `{ "error", "message" }` body.

use std::path::PathBuf;

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::allocation::AllocationError;
use crate::lesson_plan::UpstreamError;

/// Request-level error.
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed or missing request fields
    #[error("{0}")]
    InvalidInput(String),

    /// A business rule rejected the request
    #[error("{0}")]
    Validation(String),

    #[error("a report already exists for session {0}")]
    DuplicateReport(i64),

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Storage-layer errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("query failed: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("stored JSON column is malformed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database connection lock poisoned")]
    Poisoned,

    #[error("failed to create database directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<AllocationError> for AppError {
    fn from(err: AllocationError) -> Self {
        AppError::InvalidInput(err.to_string())
    }
}

// Extractor rejections answer with the same body as every other bad request.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidInput(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::InvalidInput(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::InvalidInput(rejection.body_text())
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::DuplicateReport(_) => StatusCode::CONFLICT,
            AppError::Upstream(err) if err.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // storage details stay in the log
        let message = match &self {
            AppError::Database(err) => {
                tracing::error!(error = %err, "database failure");
                "An internal error occurred".to_string()
            }
            AppError::Upstream(err) => {
                tracing::error!(error = %err, "lesson-plan service failure");
                self.to_string()
            }
            _ => {
                tracing::warn!(status = status.as_u16(), error = %self, "request rejected");
                self.to_string()
            }
        };

        let body = Json(serde_json::json!({
            "error": status.canonical_reason().unwrap_or("Error"),
            "message": message,
        }));

        (status, body).into_response()
    }
}
