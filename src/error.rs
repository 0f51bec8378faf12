use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

/// The full error taxonomy for HERMES. Every fallible core operation returns
/// this type (or wraps it via `anyhow` at the CLI boundary); the serving
/// surface turns each variant into the HTTP response its callers expect.
#[derive(Debug, thiserror::Error)]
pub enum HermesError {
    #[error("{0}")]
    Validation(String),

    #[error("No index loaded. Please index a repository first.")]
    NoIndexLoaded,

    #[error("model call failed: {0}")]
    TransientModel(String),

    #[error("integrity error: {0}")]
    Integrity(String),

    #[error("indexing error: {0}")]
    Indexing(String),
}

impl IntoResponse for HermesError {
    fn into_response(self) -> axum::response::Response {
        let (status, detail) = match &self {
            HermesError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            HermesError::NoIndexLoaded => (StatusCode::BAD_REQUEST, self.to_string()),
            HermesError::TransientModel(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "model call failed".to_string(),
            ),
            HermesError::Integrity(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            HermesError::Indexing(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, HermesError>;
