use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use measure_saver::{DecodeError, StoreError, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::json;

pub type ServerResult<T> = Result<T, ServerError>;

/// Server error types
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("parameter appid not provided")]
    MissingAppId,

    #[error("{0}")]
    InvalidBody(#[from] DecodeError),

    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The detail stays in the server log; clients only see a generic message.
    #[error("failed to store measurement")]
    Storage(#[source] StoreError),

    #[error("Service unavailable")]
    Unavailable,

    #[error("Not found")]
    NotFound,
}

/// API error response structure
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ServerError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::MissingAppId | ServerError::InvalidBody(_) | ServerError::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            ServerError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ServerError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::NotFound => StatusCode::NOT_FOUND,
            ServerError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get error code string
    pub fn error_code(&self) -> &'static str {
        match self {
            ServerError::MissingAppId => "MISSING_APP_ID",
            ServerError::InvalidBody(_) => "INVALID_BODY",
            ServerError::Validation(_) => "VALIDATION_FAILED",
            ServerError::Authentication(_) => "AUTH_FAILED",
            ServerError::Storage(_) => "STORAGE_ERROR",
            ServerError::Unavailable => "SERVICE_UNAVAILABLE",
            ServerError::NotFound => "NOT_FOUND",
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            ServerError::Validation(err) => Some(json!({ "violations": err.violations })),
            _ => None,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        if let ServerError::Storage(err) = &self {
            tracing::error!(error = %err, "Storage failure");
        }

        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.error_code().to_string(),
                message: self.to_string(),
                details: self.details(),
            },
        };

        (self.status_code(), Json(body)).into_response()
    }
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        ServerError::Storage(err)
    }
}
