//! # Error Handling
//!
//! Custom error types for the merge service and how each one becomes an HTTP
//! response. The response bodies are part of the public contract with the
//! workflow tool calling this service, so each variant owns its exact shape.
//!
//! ## Status mapping:
//! - `MethodNotAllowed` → 405 `{ "error": "Method not allowed" }`
//! - `ValidationError` → 400 `{ "error": <message> }`
//! - `NotFound` → 404 `{ "error": <message> }`
//! - `UploadFailed` → 500 `{ "status": "error", "error": <message> }`
//! - `Internal` → 500 `{ "status": "error", "error": <message>, "message": "Failed to merge audio files" }`

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

use crate::media::MediaServiceError;

/// Summary attached to every uncaught failure.
pub const MERGE_FAILED_MESSAGE: &str = "Failed to merge audio files";

/// Custom error types for the application.
///
/// ## Usage Example:
/// ```ignore
/// return Err(AppError::ValidationError("Missing required fields".to_string()));
/// ```
#[derive(Debug)]
pub enum AppError {
    /// Request used a verb other than POST
    MethodNotAllowed,

    /// Request body is missing one of the required fields
    ValidationError(String),

    /// No route matches the request path
    NotFound(String),

    /// The media service refused the greeting upload; carries the raw remote text
    UploadFailed(String),

    /// Anything else: transport failures, malformed remote responses
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::MethodNotAllowed => write!(f, "Method not allowed"),
            AppError::ValidationError(msg) => write!(f, "{}", msg),
            AppError::NotFound(msg) => write!(f, "{}", msg),
            AppError::UploadFailed(msg) => write!(f, "{}", msg),
            AppError::Internal(msg) => write!(f, "{}", msg),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::UploadFailed(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            AppError::MethodNotAllowed | AppError::ValidationError(_) | AppError::NotFound(_) => {
                json!({ "error": self.to_string() })
            }
            AppError::UploadFailed(msg) => json!({
                "status": "error",
                "error": msg
            }),
            AppError::Internal(msg) => json!({
                "status": "error",
                "error": msg,
                "message": MERGE_FAILED_MESSAGE
            }),
        };

        HttpResponse::build(self.status_code()).json(body)
    }
}

/// Media service failures that no step recovers from are reported as
/// generic merge failures.
impl From<MediaServiceError> for AppError {
    fn from(err: MediaServiceError) -> Self {
        AppError::Internal(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
