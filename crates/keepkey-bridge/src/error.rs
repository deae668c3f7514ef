//! HTTP error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use keepkey_daemon::DaemonError;
use serde_json::json;
use thiserror::Error;
use tracing::warn;

/// Errors returned by bridge handlers
///
/// Rendered as `{message, data}` with a matching status code.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Timed out waiting for user approval")]
    Timeout,

    #[error("{0}")]
    Upstream(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Timeout => StatusCode::REQUEST_TIMEOUT,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DaemonError> for ApiError {
    fn from(e: DaemonError) -> Self {
        match e {
            DaemonError::Core(e) => ApiError::BadRequest(e.to_string()),
            DaemonError::Timeout => ApiError::Timeout,
            DaemonError::PioneerUnavailable | DaemonError::NoDeviceConnected => {
                ApiError::Unavailable(e.to_string())
            }
            DaemonError::Pioneer(_) | DaemonError::Device(_) => ApiError::Upstream(e.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        warn!("Request failed ({}): {}", status.as_u16(), self);

        let body = Json(json!({
            "message": self.to_string(),
            "data": {},
        }));
        (status, body).into_response()
    }
}
