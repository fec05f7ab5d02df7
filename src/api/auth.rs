//! Account endpoints.

use axum::{extract::State, http::StatusCode, Json};

use super::{ApiJson, ApiResult};
use crate::errors::AppError;
use crate::models::{Credentials, TokenResponse};
use crate::AppState;

/// POST /auth/register - Create an account and sign in.
pub async fn register(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<Credentials>,
) -> Result<(StatusCode, Json<TokenResponse>), AppError> {
    let token = state
        .auth
        .register(&state.repo, &request.email, &request.password)
        .await?;
    Ok((StatusCode::CREATED, Json(TokenResponse { token })))
}

/// POST /auth/login - Exchange credentials for a token.
pub async fn login(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<Credentials>,
) -> ApiResult<TokenResponse> {
    let token = state
        .auth
        .login(&state.repo, &request.email, &request.password)
        .await?;
    Ok(Json(TokenResponse { token }))
}
