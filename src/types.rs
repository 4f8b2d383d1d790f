// Shared error taxonomy and result alias

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding backend error: {0}")]
    EmbeddingBackend(String),

    #[error("RAG error: {0}")]
    Rag(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = std::result::Result<T, AppError>;

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::DimensionMismatch { .. }
            | AppError::EmbeddingBackend(_)
            | AppError::Rag(_)
            | AppError::Database(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_label(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "Validation error",
            AppError::Unauthorized(_) => "Unauthorized",
            AppError::Forbidden(_) => "Forbidden",
            AppError::NotFound(_) => "Not found",
            AppError::Conflict(_) => "Conflict",
            AppError::RateLimited { .. } => "Rate limit exceeded",
            AppError::DimensionMismatch { .. } => "Dimension mismatch",
            AppError::EmbeddingBackend(_) => "Embedding backend error",
            AppError::Rag(_) => "RAG error",
            AppError::Database(_) | AppError::Internal(_) => "Internal server error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Internal causes are logged, not returned to the client
        let message = match &self {
            AppError::Database(e) => {
                tracing::error!(error = %e, "database error");
                "An internal error occurred".to_string()
            }
            AppError::Internal(e) => {
                tracing::error!(error = %e, "internal error");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        let mut body = serde_json::json!({
            "error": self.error_label(),
            "message": message,
        });

        if let AppError::RateLimited { retry_after_secs } = &self {
            body["retryAfter"] = serde_json::json!(retry_after_secs);
        }

        (status, Json(body)).into_response()
    }
}
