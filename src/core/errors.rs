use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

/// Failures raised inside the ingestion/retrieval pipeline.
///
/// Each variant maps to a short machine-checkable category via
/// [`PipelineError::category`]; handlers convert these into [`ApiError`]
/// at the HTTP boundary.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("input text is empty")]
    EmptyInput,
    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),
    #[error("no content extracted: {0}")]
    NoContentExtracted(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("embedding service error: {0}")]
    Embedding(String),
    #[error("generation service error: {0}")]
    Generation(String),
    #[error("vector store error: {0}")]
    Store(String),
    #[error("fetch error: {0}")]
    Fetch(String),
    #[error("query failed during {stage}: {message}")]
    QueryFailed { stage: &'static str, message: String },
}

impl PipelineError {
    pub fn category(&self) -> &'static str {
        match self {
            PipelineError::EmptyInput => "empty_input",
            PipelineError::UnsupportedFileType(_) => "unsupported_file_type",
            PipelineError::NoContentExtracted(_) => "no_content_extracted",
            PipelineError::InvalidUrl(_) => "invalid_url",
            PipelineError::Embedding(_) => "embedding_error",
            PipelineError::Generation(_) => "generation_error",
            PipelineError::Store(_) => "store_error",
            PipelineError::Fetch(_) => "fetch_error",
            PipelineError::QueryFailed { .. } => "query_failed",
        }
    }

    pub fn store<E: std::fmt::Display>(err: E) -> Self {
        PipelineError::Store(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("{0}")]
    Pipeline(#[from] PipelineError),
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, category, details) = match &self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Missing or invalid user identity".to_string(),
            ),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            ApiError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal", msg.clone())
            }
            ApiError::Pipeline(err) => {
                let status = match err {
                    PipelineError::EmptyInput
                    | PipelineError::UnsupportedFileType(_)
                    | PipelineError::NoContentExtracted(_)
                    | PipelineError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.category(), err.to_string())
            }
        };

        let body = Json(json!({ "error": category, "details": details }));
        (status, body).into_response()
    }
}
