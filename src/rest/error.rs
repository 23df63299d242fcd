use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::storage::StorageError;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Storage(StorageError),
    Internal(anyhow::Error),
}

#[derive(Serialize)]
struct ErrorResponse {
    message: String,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Storage(StorageError::SecretRequired) => (
                StatusCode::FORBIDDEN,
                StorageError::SecretRequired.to_string(),
            ),
            ApiError::Storage(e) => (StatusCode::BAD_REQUEST, format!("Storage error: {}", e)),
            ApiError::Internal(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Internal error: {}", e),
            ),
        };
        (status, Json(ErrorResponse { message })).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        ApiError::Storage(e)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(e)
    }
}
