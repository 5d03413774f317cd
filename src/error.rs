use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::error;

/// Failures of the points engine and the stores behind it.
#[derive(Debug, Error)]
pub enum PointsError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] sqlx::Error),

    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// Errors returned by HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Points(#[from] PointsError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("cannot act on behalf of another user")]
    Forbidden,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            ApiError::Points(PointsError::NotFound(_)) => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::Points(PointsError::Conflict(_)) => (StatusCode::CONFLICT, self.to_string()),
            ApiError::Points(PointsError::InvalidInput(_)) | ApiError::BadRequest(_) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            ApiError::Points(PointsError::DeadlineExceeded) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "request timed out".to_string(),
            ),
            ApiError::Points(PointsError::StoreUnavailable(_)) | ApiError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".to_string(),
            ),
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, self.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        if status.is_server_error() {
            // Detail stays in the logs; clients get the opaque message.
            error!(error = %self, %status, "request failed");
        }
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
