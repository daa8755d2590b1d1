//! Error handling for Motioncam

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Capture device fault (ffmpeg spawn/exit, frame decode)
    #[error("Camera error: {0}")]
    Camera(String),

    /// Capture call exceeded its deadline
    #[error("Capture timed out after {seconds}s: {operation}")]
    CaptureTimeout { operation: String, seconds: u64 },

    /// Post-processing fault (remux/thumbnail)
    #[error("Transcode error: {0}")]
    Transcode(String),

    /// Config error
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            Error::Camera(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "CAMERA_ERROR",
                msg.clone(),
            ),
            Error::CaptureTimeout { operation, seconds } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "CAPTURE_TIMEOUT",
                format!("{} timed out after {}s", operation, seconds),
            ),
            Error::Transcode(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "TRANSCODE_ERROR",
                msg.clone(),
            ),
            Error::Config(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIG_ERROR",
                msg.clone(),
            ),
            Error::Io(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "IO_ERROR",
                e.to_string(),
            ),
        };

        tracing::error!(
            status = %status,
            error_code = %error_code,
            message = %message,
            "Request error"
        );

        let body = Json(json!({
            "error_code": error_code,
            "message": message
        }));

        (status, body).into_response()
    }
}
