//! API error types with structured JSON responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use visit_tracker_core::VisitTrackerError;

/// Error response body, shaped like the success envelope.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<serde_json::Value>,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Validation failed")]
    Validation(Vec<String>),
    #[error("No valid patient records found")]
    NoValidRecords(serde_json::Value),
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, errors) = match self {
            ApiError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_FAILED",
                "Validation failed".to_string(),
                Some(serde_json::json!(errors)),
            ),
            ApiError::NoValidRecords(errors) => (
                StatusCode::BAD_REQUEST,
                "NO_VALID_RECORDS",
                "No valid patient records found".to_string(),
                Some(errors),
            ),
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail, None),
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, "NOT_FOUND", detail, None),
            ApiError::Conflict(detail) => (StatusCode::CONFLICT, "CONFLICT", detail, None),
            ApiError::PayloadTooLarge(detail) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE", detail, None)
            }
            ApiError::Internal(detail) => {
                tracing::error!(%detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorBody {
            success: false,
            code,
            message,
            errors,
        };
        (status, Json(body)).into_response()
    }
}

impl From<VisitTrackerError> for ApiError {
    fn from(err: VisitTrackerError) -> Self {
        match err {
            VisitTrackerError::Validation(errors) => ApiError::Validation(errors),
            VisitTrackerError::NoValidRecords(errors) => {
                ApiError::NoValidRecords(serde_json::json!(errors))
            }
            VisitTrackerError::NotFound(id) => {
                ApiError::NotFound(format!("Patient not found with Aadhar number {id}"))
            }
            VisitTrackerError::Conflict(id) => {
                ApiError::Conflict(format!("Patient already exists with Aadhar number {id}"))
            }
            err @ (VisitTrackerError::InvalidInput(_)
            | VisitTrackerError::UnsupportedFormat(_)
            | VisitTrackerError::Parse(_)
            | VisitTrackerError::InvalidRange { .. }) => ApiError::BadRequest(err.to_string()),
            err @ (VisitTrackerError::Storage(_)
            | VisitTrackerError::Export(_)
            | VisitTrackerError::LockPoisoned) => ApiError::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn validation_returns_400_with_field_errors() {
        let response = ApiError::Validation(vec!["Name is required".into()]).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["code"], "VALIDATION_FAILED");
        assert_eq!(json["errors"][0], "Name is required");
    }

    #[tokio::test]
    async fn not_found_returns_404() {
        let response = ApiError::from(VisitTrackerError::NotFound("123456789012".into()))
            .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unsupported_format_returns_400() {
        let response = ApiError::from(VisitTrackerError::UnsupportedFormat("a.pdf".into()))
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn internal_hides_details() {
        let response = ApiError::from(VisitTrackerError::Storage("disk I/O error".into()))
            .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["message"], "An internal error occurred");
        assert!(json.get("errors").is_none());
    }
}
