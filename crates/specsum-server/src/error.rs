//! Request-boundary error mapping. Every failure becomes `{ "error": string }`.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use specsum_ingest::SourceError;
use specsum_runtime::PipelineError;
use thiserror::Error;
use tracing::error;

/// Shown to clients for any model-side failure; the cause is only logged.
pub const UPSTREAM_FAILURE: &str = "Failed to extract materials";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unprocessable(String),

    #[error("upstream failure: {0}")]
    Upstream(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Upstream(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to the client.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Upstream(_) => UPSTREAM_FAILURE.to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{}", self);
        }
        (status, Json(serde_json::json!({ "error": self.public_message() }))).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::InvalidInput(msg) => ApiError::BadRequest(msg),
            PipelineError::Config(msg) => ApiError::Internal(msg),
            upstream => ApiError::Upstream(upstream.to_string()),
        }
    }
}

impl From<SourceError> for ApiError {
    fn from(e: SourceError) -> Self {
        ApiError::Unprocessable(e.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::BadRequest(format!("Invalid request body: {}", e.body_text()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use specsum_chat::ServiceError;

    #[test]
    fn test_upstream_detail_hidden() {
        let err: ApiError = PipelineError::Extraction {
            chunk: 2,
            total: 3,
            source: ServiceError::Api {
                status: 401,
                body: "invalid key sk-123".into(),
            },
        }
        .into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), UPSTREAM_FAILURE);
        assert!(err.to_string().contains("chunk 2 of 3"));
    }

    #[test]
    fn test_invalid_input_is_bad_request() {
        let err: ApiError = PipelineError::InvalidInput("Section text is required".into()).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.public_message(), "Section text is required");
    }

    #[test]
    fn test_keyword_not_found_is_unprocessable() {
        let err: ApiError = SourceError::KeywordNotFound("UNIT MASONRY".into()).into();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(err.public_message().contains("UNIT MASONRY"));
    }
}
