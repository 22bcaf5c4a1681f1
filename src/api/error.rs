//! API error types with structured JSON responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::api::compose::ComposeError;
use crate::pipeline::PipelineError;
use crate::store::StoreError;

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
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Too many concurrent requests")]
    Busy,
    #[error("Pipeline unavailable: {0}")]
    Unavailable(String),
    #[error("Not configured: {0}")]
    NotConfigured(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, "NOT_FOUND", detail.clone()),
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                )
            }
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail.clone()),
            ApiError::Busy => (
                StatusCode::SERVICE_UNAVAILABLE,
                "BUSY",
                "The server is busy processing requests. Retry shortly".to_string(),
            ),
            ApiError::Unavailable(detail) => {
                (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE", detail.clone())
            }
            ApiError::NotConfigured(detail) => {
                (StatusCode::NOT_IMPLEMENTED, "NOT_CONFIGURED", detail.clone())
            }
        };

        let body = ErrorBody {
            error: ErrorDetail { code, message },
        };

        let mut response = (status, Json(body)).into_response();
        if let ApiError::Busy = &self {
            response
                .headers_mut()
                .insert("Retry-After", axum::http::HeaderValue::from_static("1"));
        }
        response
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::NotFound(_) => ApiError::NotFound(err.to_string()),
            PipelineError::InvalidParams(_) | PipelineError::InvalidInput(_) => {
                ApiError::BadRequest(err.to_string())
            }
            PipelineError::Released(_) => ApiError::Unavailable(err.to_string()),
            PipelineError::Parse(_)
            | PipelineError::Validation(_)
            | PipelineError::Allocation(_)
            | PipelineError::Execution { .. }
            | PipelineError::Io(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateDocument(_) => ApiError::BadRequest(err.to_string()),
            StoreError::LockPoisoned => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<ComposeError> for ApiError {
    fn from(err: ComposeError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), 4096).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn busy_returns_503_with_retry_after() {
        let response = ApiError::Busy.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers().get("Retry-After").unwrap(), "1");
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "BUSY");
    }

    #[tokio::test]
    async fn internal_hides_details() {
        let response = ApiError::Internal("lock poisoned".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["error"]["message"], "An internal error occurred");
    }

    #[tokio::test]
    async fn not_configured_returns_501() {
        let response = ApiError::NotConfigured("no indexing pipeline".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "NOT_CONFIGURED");
    }

    #[test]
    fn pipeline_errors_map_to_statuses() {
        let cases = [
            (PipelineError::Parse("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (PipelineError::Validation("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (PipelineError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (PipelineError::InvalidParams("x".into()), StatusCode::BAD_REQUEST),
            (PipelineError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (
                PipelineError::Execution {
                    stage: "Reader".into(),
                    message: "x".into(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (PipelineError::Released("p".into()), StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }

    #[tokio::test]
    async fn execution_errors_hide_stage_details() {
        let err = PipelineError::Execution {
            stage: "Reader".into(),
            message: "index out of range at /srv/data".into(),
        };
        let json = body_json(ApiError::from(err).into_response()).await;
        assert!(!json["error"]["message"].as_str().unwrap().contains("/srv/data"));
    }
}
