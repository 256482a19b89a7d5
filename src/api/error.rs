//! API error types with structured JSON responses.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::pipeline::AssessmentError;

/// Seconds a client should wait before resubmitting while the model loads.
pub const MODEL_RETRY_AFTER_SECS: u64 = 5;

/// Structured error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Drawing could not be decoded: {0}")]
    Decode(String),
    #[error("Drawing is empty: {0}")]
    EmptySubmission(String),
    #[error("Unknown character: {0}")]
    UnknownTarget(String),
    #[error("Scoring model unavailable")]
    ModelUnavailable { retry_after: u64 },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::BadRequest(detail) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail.clone())
            }
            ApiError::Decode(detail) => (StatusCode::BAD_REQUEST, "DECODE_ERROR", detail.clone()),
            ApiError::EmptySubmission(detail) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "EMPTY_SUBMISSION",
                detail.clone(),
            ),
            ApiError::UnknownTarget(id) => (
                StatusCode::NOT_FOUND,
                "UNKNOWN_TARGET",
                format!("No character with id '{id}'"),
            ),
            ApiError::ModelUnavailable { retry_after } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "MODEL_UNAVAILABLE",
                format!("Scoring model is loading. Retry after {retry_after}s"),
            ),
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, "NOT_FOUND", detail.clone()),
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ErrorBody {
            error: ErrorDetail { code, message },
        };

        let mut response = (status, Json(body)).into_response();
        if let ApiError::ModelUnavailable { retry_after } = &self {
            if let Ok(val) = axum::http::HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert("Retry-After", val);
            }
        }
        response
    }
}

impl From<AssessmentError> for ApiError {
    fn from(err: AssessmentError) -> Self {
        match err {
            AssessmentError::Decode(e) => ApiError::Decode(e.to_string()),
            e @ AssessmentError::EmptySubmission { .. } => ApiError::EmptySubmission(format!(
                "Draw a little more before submitting ({e})"
            )),
            AssessmentError::UnknownTarget(id) => ApiError::UnknownTarget(id),
            AssessmentError::ModelUnavailable(_) => ApiError::ModelUnavailable {
                retry_after: MODEL_RETRY_AFTER_SECS,
            },
            AssessmentError::NotFound(id) => ApiError::NotFound(format!("No result with id {id}")),
            other => ApiError::Internal(format!("{}: {other}", other.code())),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}
