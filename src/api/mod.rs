//! REST API module.
//!
//! Contains all API routes and handlers following the browser client contract.

mod auth;
mod chat;
mod conversations;
mod flashcards;
mod quiz;

pub use auth::*;
pub use chat::*;
pub use conversations::*;
pub use flashcards::*;
pub use quiz::*;

use axum::{extract::FromRequest, extract::State, Json};
use serde::Serialize;

use crate::errors::AppError;
use crate::AppState;

/// JSON body extractor whose rejections surface as `validation_error`.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Response type for JSON endpoints.
pub type ApiResult<T> = Result<Json<T>, AppError>;

/// Health check body.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Seconds since the server started
    pub uptime: f64,
}

/// GET /health - Liveness probe.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime: state.started_at.elapsed().as_secs_f64(),
    })
}
