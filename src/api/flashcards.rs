//! Flashcard API endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};

use super::{ApiJson, ApiResult};
use crate::auth::Caller;
use crate::errors::AppError;
use crate::models::{FlashcardSet, GenerateFlashcardsRequest, GeneratedFlashcards, OkResponse};
use crate::services::flashcards;
use crate::AppState;

/// POST /flashcards/generate - Generate and store a flashcard set.
pub async fn generate_flashcards(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiJson(request): ApiJson<GenerateFlashcardsRequest>,
) -> Result<(StatusCode, Json<GeneratedFlashcards>), AppError> {
    let set = flashcards::generate(
        &state.repo,
        state.gateway.as_ref(),
        &caller.user_id,
        &request.topic,
        request.num_cards,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(set)))
}

/// GET /flashcards - List own sets.
pub async fn list_flashcards(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Vec<FlashcardSet>> {
    Ok(Json(flashcards::list(&state.repo, &caller.user_id).await?))
}

/// DELETE /flashcards/:id - Delete an owned set.
pub async fn delete_flashcards(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> ApiResult<OkResponse> {
    flashcards::delete(&state.repo, &caller.user_id, &id).await?;
    Ok(Json(OkResponse { ok: true }))
}
