//! Error handling module for the NeoLearn backend.
//!
//! Provides centralized error types with mapping to HTTP status codes and JSON error bodies.

use std::any::Any;

use axum::{
    body::Body,
    extract::{multipart::MultipartError, rejection::JsonRejection, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::config::Environment;
use crate::gateway::GatewayError;

/// Error codes as constants to avoid stringly-typed errors.
pub mod codes {
    pub const VALIDATION_ERROR: &str = "validation_error";
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const INVALID_CREDENTIALS: &str = "invalid_credentials";
    pub const EMAIL_EXISTS: &str = "email_exists";
    pub const CONFLICT: &str = "conflict";
    pub const NOT_FOUND: &str = "not_found";
    pub const GEMINI_ERROR: &str = "gemini_error";
    pub const EMPTY_RESPONSE: &str = "empty_response_from_model";
    pub const RATE_LIMITED: &str = "rate_limited";
    pub const INTERNAL_ERROR: &str = "internal_error";
}

/// Message substituted for internal errors in production.
pub const REDACTED_MESSAGE: &str = "An unexpected error occurred.";

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    /// Malformed or out-of-range input
    Validation(String),
    /// Missing, invalid or expired bearer token
    Unauthorized(String),
    /// Unknown email or wrong password, deliberately not told apart
    InvalidCredentials,
    /// Duplicate unique key or lost update race
    Conflict { code: &'static str, message: String },
    /// Resource absent or owned by someone else
    NotFound(String),
    /// Generation gateway failed or timed out
    Upstream { status: Option<u16>, message: String },
    /// Generation gateway answered with no text
    EmptyResponse,
    /// Too many requests from one client
    RateLimited,
    /// Database error
    Database(String),
    /// Internal server error
    Internal(String),
}

impl AppError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) | AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Upstream { status, .. } => status
                .filter(|code| (400..=599).contains(code))
                .and_then(|code| StatusCode::from_u16(code).ok())
                .unwrap_or(StatusCode::BAD_GATEWAY),
            AppError::EmptyResponse => StatusCode::BAD_GATEWAY,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => codes::VALIDATION_ERROR,
            AppError::Unauthorized(_) => codes::UNAUTHORIZED,
            AppError::InvalidCredentials => codes::INVALID_CREDENTIALS,
            AppError::Conflict { code, .. } => *code,
            AppError::NotFound(_) => codes::NOT_FOUND,
            AppError::Upstream { .. } => codes::GEMINI_ERROR,
            AppError::EmptyResponse => codes::EMPTY_RESPONSE,
            AppError::RateLimited => codes::RATE_LIMITED,
            AppError::Database(_) | AppError::Internal(_) => codes::INTERNAL_ERROR,
        }
    }

    /// Get the error message.
    pub fn message(&self) -> String {
        match self {
            AppError::Validation(msg)
            | AppError::Unauthorized(msg)
            | AppError::NotFound(msg)
            | AppError::Database(msg)
            | AppError::Internal(msg) => msg.clone(),
            AppError::InvalidCredentials => "Invalid email or password".to_string(),
            AppError::Conflict { message, .. } | AppError::Upstream { message, .. } => {
                message.clone()
            }
            AppError::EmptyResponse => "The model returned an empty response".to_string(),
            AppError::RateLimited => "Too many requests, please slow down".to_string(),
        }
    }

    fn is_internal(&self) -> bool {
        self.status_code() == StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_code(), self.message())
    }
}

impl std::error::Error for AppError {}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        AppError::Database(format!("Database error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("JSON error: {:?}", err);
        AppError::Internal(format!("JSON error: {}", err))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::Validation(format!("Invalid upload: {}", err.body_text()))
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        tracing::error!("Generation gateway error: {}", err);
        AppError::Upstream {
            status: err.status(),
            message: err.to_string(),
        }
    }
}

/// JSON error body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// Request path, set on unmatched routes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: &AppError) -> Self {
        Self {
            error: error.error_code().to_string(),
            message: Some(error.message()),
            details: None,
            path: None,
        }
    }
}

/// Marker left on 500 responses so the redaction layer can find them.
#[derive(Debug, Clone)]
pub struct InternalErrorDetail(pub String);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse::new(&self);
        let mut response = (status, Json(body)).into_response();
        if self.is_internal() {
            response
                .extensions_mut()
                .insert(InternalErrorDetail(self.message()));
        }
        response
    }
}

/// Centralized handler for internal errors.
///
/// In production the body of every 500 produced by [`AppError`] (or a caught
/// panic) is replaced with a generic message. Development keeps the original
/// message and adds the captured detail.
pub async fn redact_internal_errors(
    State(environment): State<Environment>,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;

    let Some(detail) = response.extensions().get::<InternalErrorDetail>().cloned() else {
        return response;
    };

    let body = if environment.is_production() {
        ErrorResponse {
            error: codes::INTERNAL_ERROR.to_string(),
            message: Some(REDACTED_MESSAGE.to_string()),
            details: None,
            path: None,
        }
    } else {
        ErrorResponse {
            error: codes::INTERNAL_ERROR.to_string(),
            message: Some(detail.0.clone()),
            details: Some(serde_json::json!({ "detail": detail.0 })),
            path: None,
        }
    };

    (response.status(), Json(body)).into_response()
}

/// Turns a panic inside a handler into an internal error response.
pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let detail = if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "handler panicked".to_string()
    };
    tracing::error!("Handler panicked: {}", detail);
    AppError::Internal(detail).into_response()
}

/// Fallback for unmatched routes.
pub async fn not_found(uri: axum::http::Uri) -> Response {
    let body = ErrorResponse {
        error: codes::NOT_FOUND.to_string(),
        message: None,
        details: None,
        path: Some(uri.path().to_string()),
    };
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}
