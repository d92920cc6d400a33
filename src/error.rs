use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::fmt::Display;

use crate::services::detector::DetectorError;

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

pub fn internal_error(err: impl Display) -> (StatusCode, String) {
    tracing::error!(error = %err, "internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
    )
}

/// Core failures bubble up unchanged; only the HTTP status is decided here.
/// InsufficientData is the caller's data problem, HorizonExhausted a sequencing
/// problem, and a model failure an upstream one.
pub fn map_detector_error(err: DetectorError) -> (StatusCode, String) {
    let status = match &err {
        DetectorError::InsufficientData { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        DetectorError::HorizonExhausted { .. } => StatusCode::CONFLICT,
        DetectorError::Model(_) => StatusCode::BAD_GATEWAY,
    };
    tracing::error!(error = %err, status = %status, "detector error");
    (status, err.to_string())
}
