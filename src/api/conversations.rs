//! Conversation API endpoints.
//!
//! Every handler here runs behind the bearer-token gate and scopes its store
//! access to the [`Caller`].

use axum::{
    extract::{Multipart, Path, State},
    Extension, Json,
};

use super::{ApiJson, ApiResult};
use crate::auth::Caller;
use crate::errors::AppError;
use crate::models::{
    Attachment, Conversation, CreateConversationRequest, DeleteConversationResponse, Message,
    RenameConversationRequest,
};
use crate::AppState;

/// GET /conversations - List own and legacy conversations.
pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Vec<Conversation>> {
    Ok(Json(state.conversations.list(&caller.user_id).await?))
}

/// GET /conversations/:id - Get one owned conversation.
pub async fn get_conversation(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> ApiResult<Conversation> {
    Ok(Json(state.conversations.get(&caller.user_id, &id).await?))
}

/// POST /conversations - Start a conversation.
pub async fn create_conversation(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiJson(request): ApiJson<CreateConversationRequest>,
) -> ApiResult<Conversation> {
    let conversation = state
        .conversations
        .create(&caller.user_id, request)
        .await?;
    tracing::debug!(conversation_id = %conversation.id, "Created conversation");
    Ok(Json(conversation))
}

/// POST /conversations/:id/messages - Append a message.
pub async fn append_message(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    ApiJson(message): ApiJson<Message>,
) -> ApiResult<Conversation> {
    Ok(Json(
        state
            .conversations
            .append_message(&caller.user_id, &id, message)
            .await?,
    ))
}

/// PATCH /conversations/:id/title - Rename a conversation.
pub async fn rename_conversation(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<RenameConversationRequest>,
) -> ApiResult<Conversation> {
    Ok(Json(
        state
            .conversations
            .rename(&caller.user_id, &id, &request.title)
            .await?,
    ))
}

/// DELETE /conversations/:id - Delete a conversation.
pub async fn delete_conversation(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> ApiResult<DeleteConversationResponse> {
    state.conversations.delete(&caller.user_id, &id).await?;
    Ok(Json(DeleteConversationResponse {
        message: "Conversation deleted successfully".to_string(),
    }))
}

/// POST /conversations/upload - Store one attachment from the `file` field.
pub async fn upload_attachment(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    mut multipart: Multipart,
) -> ApiResult<Attachment> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let mime_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = field.bytes().await?;

        let attachment = state.uploads.store(&file_name, &mime_type, &data).await?;
        tracing::info!(user_id = %caller.user_id, url = %attachment.url, "Attachment uploaded");
        return Ok(Json(attachment));
    }

    Err(AppError::Validation("No file uploaded".to_string()))
}
