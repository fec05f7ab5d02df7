//! Anonymous chat relay endpoint.

use axum::{extract::State, Json};

use super::{ApiJson, ApiResult};
use crate::models::{ChatRequest, ChatResponse};
use crate::services::chat;
use crate::AppState;

/// POST /chat - Relay one message to the model. No authentication.
pub async fn send_chat(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ChatRequest>,
) -> ApiResult<ChatResponse> {
    let response = chat::send(&state.repo, state.gateway.as_ref(), &request.message).await?;
    Ok(Json(response))
}
