use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::GenericResponse;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("attempt id must not be blank")]
    InvalidAttempt,

    #[error("attempt {0} is already submitted")]
    AttemptClosed(String),

    #[error("database write failed: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("stored record is corrupt: {0}")]
    Corrupt(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::InvalidAttempt => StatusCode::BAD_REQUEST,
            AppError::AttemptClosed(_) => StatusCode::CONFLICT,
            AppError::Database(_) | AppError::Corrupt(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!("[server] {}", self);
        }

        let body = GenericResponse {
            status: "error".to_string(),
            message: format!("[server] {}", self),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}
