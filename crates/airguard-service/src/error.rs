//! Service error type and its HTTP mapping.
//!
//! Every failure a handler can surface is an [`AppError`]. Responses use the
//! same `{success, message}` envelope as successful calls.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

/// Errors returned by registry, ingestion and aggregation operations.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("No connected device found for this account")]
    NoConnectedDevice,
    #[error("No sensor data found in the {0} window")]
    NoData(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("Store error: {0}")]
    Store(airguard_store::Error),
}

impl AppError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NoConnectedDevice => StatusCode::BAD_REQUEST,
            AppError::NoData(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::BAD_REQUEST,
            AppError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<airguard_store::Error> for AppError {
    fn from(e: airguard_store::Error) -> Self {
        match e {
            airguard_store::Error::DeviceNotFound(_) => AppError::NotFound("Device not found".into()),
            airguard_store::Error::NameTaken(name) => {
                AppError::Conflict(format!("Device name '{}' is already in use", name))
            }
            other => AppError::Store(other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        let body = serde_json::json!({
            "success": false,
            "message": self.to_string(),
        });

        (status, Json(body)).into_response()
    }
}
