use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Match version changed since it was loaded")]
    VersionMismatch,
    #[error("Match does not exist")]
    MissingMatch,
    #[error("Match already exists")]
    DuplicateMatch,
    #[error("Stored row is corrupt: {0}")]
    Corrupt(String),
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{field}: {message}")]
    Validation { field: String, message: String },
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl EngineError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        EngineError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn missing(field: &str) -> Self {
        Self::validation(field, "is required")
    }

    pub fn status(&self) -> StatusCode {
        match self {
            EngineError::Validation { .. } => StatusCode::BAD_REQUEST,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::Conflict(_) => StatusCode::CONFLICT,
            EngineError::Forbidden(_) => StatusCode::FORBIDDEN,
            EngineError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label used for metrics and log fields.
    pub fn class(&self) -> &'static str {
        match self {
            EngineError::Validation { .. } => "validation",
            EngineError::NotFound(_) => "not_found",
            EngineError::Conflict(_) => "conflict",
            EngineError::Forbidden(_) => "forbidden",
            EngineError::Store(_) => "store",
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VersionMismatch => {
                EngineError::Conflict("match was modified by another request".to_string())
            }
            StoreError::MissingMatch => EngineError::NotFound("match not found".to_string()),
            StoreError::DuplicateMatch => {
                EngineError::Conflict("match already exists".to_string())
            }
            other => EngineError::Store(other),
        }
    }
}

impl From<JsonRejection> for EngineError {
    fn from(rejection: JsonRejection) -> Self {
        EngineError::validation("body", rejection.body_text())
    }
}

impl From<QueryRejection> for EngineError {
    fn from(rejection: QueryRejection) -> Self {
        EngineError::validation("query", rejection.body_text())
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
