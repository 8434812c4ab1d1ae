use crate::services::storage_service::StorageError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// Error returned by emulator handlers, rendered the way the hosted storage
/// API renders its errors: `{statusCode, error, message}`.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub error: &'static str,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, error: &'static str, msg: impl Into<String>) -> Self {
        Self {
            status,
            error,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", msg)
    }

    /// Shortcut for 401 Unauthorized
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Unauthorized", msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "statusCode": self.status.as_u16().to_string(),
            "error": self.error,
            "message": self.message,
        }));

        (self.status, body).into_response()
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        let message = err.to_string();
        match err {
            StorageError::BucketNotFound(_) | StorageError::ObjectNotFound { .. } => {
                AppError::new(StatusCode::NOT_FOUND, "not_found", message)
            }
            StorageError::BucketAlreadyExists(_) | StorageError::ObjectAlreadyExists { .. } => {
                AppError::new(StatusCode::CONFLICT, "Duplicate", message)
            }
            StorageError::InvalidBucketName { .. } => {
                AppError::new(StatusCode::BAD_REQUEST, "InvalidBucketName", message)
            }
            StorageError::InvalidObjectKey => {
                AppError::new(StatusCode::BAD_REQUEST, "InvalidKey", message)
            }
            StorageError::Sqlx(err) => {
                tracing::error!("metadata store failure: {}", err);
                AppError::internal(message)
            }
            StorageError::Io(err) => {
                tracing::error!("payload store failure: {}", err);
                AppError::internal(message)
            }
        }
    }
}
