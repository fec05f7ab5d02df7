//! Quiz API endpoints.

use axum::{extract::State, http::StatusCode, Extension, Json};

use super::{ApiJson, ApiResult};
use crate::auth::Caller;
use crate::errors::AppError;
use crate::models::{
    GenerateQuizRequest, GeneratedQuiz, QuizAttempt, SubmitQuizRequest, SubmitQuizResponse,
};
use crate::services::quiz;
use crate::AppState;

/// POST /quiz/generate - Generate multiple-choice questions on a topic.
pub async fn generate_quiz(
    State(state): State<AppState>,
    Extension(_caller): Extension<Caller>,
    ApiJson(request): ApiJson<GenerateQuizRequest>,
) -> ApiResult<GeneratedQuiz> {
    let generated = quiz::generate(
        state.gateway.as_ref(),
        &request.topic,
        request.num_questions,
    )
    .await?;
    Ok(Json(generated))
}

/// POST /quiz/submit - Record a finished attempt.
pub async fn submit_quiz(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiJson(request): ApiJson<SubmitQuizRequest>,
) -> Result<(StatusCode, Json<SubmitQuizResponse>), AppError> {
    let result = quiz::submit(
        &state.repo,
        &caller.user_id,
        &request.topic,
        request.total_questions,
        request.correct,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(result)))
}

/// GET /quiz/history - Most recent attempts, newest first.
pub async fn quiz_history(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Vec<QuizAttempt>> {
    Ok(Json(quiz::history(&state.repo, &caller.user_id).await?))
}
