use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Error taxonomy spanning both pipeline failures (spec.md §7) and the HTTP
/// surface wrapping them. `thiserror`-derived and converted to an HTTP
/// response the same way every handler in this crate returns `ApiResult<T>`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed or missing request input (bad project/env, unparsable
    /// prompt, missing required field).
    #[error("invalid input: {0}")]
    Input(String),

    /// A log source (file tree or Loki endpoint) could not be reached or
    /// returned nothing usable.
    #[error("log acquisition failed: {0}")]
    Acquisition(String),

    /// A log record could not be framed into a `LogEntry` (malformed XML
    /// row, malformed JSON stream).
    #[error("log framing failed: {0}")]
    Framing(String),

    /// An LLM provider call failed outright (network error, non-2xx, no
    /// providers configured).
    #[error("llm call failed: {0}")]
    Llm(String),

    /// The cache gateway itself failed (L2 backend unreachable, lock
    /// acquisition error not tolerated by the fallback path).
    #[error("cache error: {0}")]
    Cache(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn validation_error(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }

    pub fn acquisition(msg: impl Into<String>) -> Self {
        Self::Acquisition(msg.into())
    }

    pub fn framing(msg: impl Into<String>) -> Self {
        Self::Framing(msg.into())
    }

    pub fn llm(msg: impl Into<String>) -> Self {
        Self::Llm(msg.into())
    }

    pub fn cache(msg: impl Into<String>) -> Self {
        Self::Cache(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Input(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Acquisition(_) | ApiError::Framing(_) => StatusCode::BAD_GATEWAY,
            ApiError::Llm(_) => StatusCode::BAD_GATEWAY,
            ApiError::Cache(_) | ApiError::Io(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::Input(_) => "input",
            ApiError::Acquisition(_) => "acquisition",
            ApiError::Framing(_) => "framing",
            ApiError::Llm(_) => "llm",
            ApiError::Cache(_) => "cache",
            ApiError::Io(_) => "io",
            ApiError::NotFound(_) => "not_found",
            ApiError::Validation(_) => "validation",
            ApiError::Internal(_) => "internal",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let kind = self.kind();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, kind, "request failed");
        } else {
            tracing::warn!(error = %self, kind, "request rejected");
        }
        let body = ErrorBody { error: kind, message: self.to_string() };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
