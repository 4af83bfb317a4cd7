//! HTTP surface of both services.
//!
//! - [`source_router`]: Platform CRUD, bulk sync responder, health
//! - [`replica_router`]: push ingest, Commands, health

mod replica;
mod source;

pub use replica::replica_router;
pub use source::source_router;

use crate::error::ReplicationError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// API error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Anything raised by the replication layer.
    #[error(transparent)]
    Replication(#[from] ReplicationError),
}

/// JSON error response body.
#[derive(Debug, Clone, Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match &self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            Self::Replication(err @ ReplicationError::NotFound { .. }) => {
                (StatusCode::NOT_FOUND, "not_found", Some(err.to_string()))
            }
            Self::Replication(err) => {
                tracing::error!(error = %err, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    Some("An internal error occurred".to_string()),
                )
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_not_found_maps_to_404() {
        let response = ApiError::from(ReplicationError::platform_not_found(9)).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_other_errors_map_to_500() {
        let response =
            ApiError::from(ReplicationError::Internal("boom".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
