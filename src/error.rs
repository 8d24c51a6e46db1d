//! Request-level error taxonomy.
//!
//! Only terminal outcomes live here. Persistence and prompt-store failures
//! are recovered where they happen (fallback to the local store, skip the
//! failing sink) and never surface to the caller.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// The request carried no usable image reference, or an unusable one.
    #[error("{0}")]
    InvalidInput(String),

    /// The credential environment variable is not set.
    #[error("{0} not configured")]
    MissingCredential(String),

    /// The vision API returned a non-success status or was unreachable.
    #[error("{0}")]
    Upstream(String),

    /// The same image reference was seen inside the dedup window.
    #[error("a request for this image was received less than {window_secs}s ago")]
    Duplicate { window_secs: u64 },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Duplicate { .. } => {
                let body = serde_json::json!({
                    "error": "Duplicate request",
                    "message": self.to_string(),
                });
                (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response()
            }
            _ => {
                let body = serde_json::json!({
                    "error": self.to_string(),
                    "details": "Check server logs for more information",
                });
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            }
        }
    }
}
