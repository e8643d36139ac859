//! Error types for sparkgate
//!
//! One taxonomy covers the client surface and the upstream failure modes.
//! Credential faults (rate limit, free quota, not logged in) never appear
//! here: they are consumed by the retry loop and only surface as
//! `AllCredentialsUnavailable` once the pool is exhausted.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("{0}")]
    InvalidToolCall(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("No valid cookies available")]
    NoCredentials,

    #[error("All cookies are temporarily unavailable.")]
    AllCredentialsUnavailable,

    #[error("Detected Cloudflare Challenge Page")]
    CloudflareChallenge,

    #[error("CloudFlare: Sorry, you have been blocked")]
    CloudflareBlock,

    #[error("Upstream service unavailable")]
    ServiceUnavailable,

    #[error("An error occurred with the current request, please try again.")]
    ServerError,

    #[error("Server overloaded, please try again later.")]
    ServerOverloaded,

    #[error("Upstream transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Convenience alias used throughout the crate
pub type AppResult<T> = Result<T, AppError>;

/// OpenAI-shaped error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error details
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: String,
    pub code: String,
}

impl AppError {
    /// HTTP status for this error kind
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::InvalidToolCall(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            AppError::InvalidToolCall(_) => "invalid_tool_call",
            _ => "request_error",
        }
    }

    /// Serialized body used both for plain JSON responses and for the
    /// final chunk of a stream that failed after bytes went out.
    pub fn to_body(&self) -> ErrorResponse {
        ErrorResponse {
            error: ErrorBody {
                message: self.to_string(),
                error_type: self.error_type().to_string(),
                code: self.status().as_u16().to_string(),
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::warn!(error = %self, "request rejected");
        }
        (status, Json(self.to_body())).into_response()
    }
}
