use crate::services::backend::BackendError;
use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::{fmt, io};
use thiserror::Error;

/// Failures of a gateway operation, before they are mapped to HTTP.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Missing or empty required input.
    #[error("{0}")]
    Validation(String),

    /// The backend call failed. `context` is prepended to its message.
    #[error("{context}{source}")]
    Backend {
        context: &'static str,
        #[source]
        source: BackendError,
    },

    /// The local staging file could not be created or written.
    #[error("staging failed: {0}")]
    Staging(#[from] io::Error),
}

impl GatewayError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn backend(context: &'static str) -> impl FnOnce(BackendError) -> Self {
        move |source| Self::Backend { context, source }
    }
}

impl From<BackendError> for GatewayError {
    fn from(source: BackendError) -> Self {
        Self::Backend {
            context: "",
            source,
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.message }));

        (self.status, body).into_response()
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Validation(msg) => AppError::bad_request(msg),
            other => {
                tracing::warn!("request failed: {}", other);
                AppError::internal(other.to_string())
            }
        }
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::new(err.status(), err.body_text())
    }
}
