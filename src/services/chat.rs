//! Anonymous chat relay.
//!
//! Forwards a single message to the generation gateway and records the
//! exchange as a legacy conversation with no owner.

use crate::db::Repository;
use crate::errors::AppError;
use crate::gateway::GenerationGateway;
use crate::models::{ChatResponse, ConversationOwner, Message};

/// Title given to conversations written by the relay.
pub const LEGACY_CHAT_TITLE: &str = "Legacy Chat";

/// Longest accepted message, in characters.
pub const MAX_CHAT_MESSAGE_CHARS: usize = 4000;

pub async fn send(
    repo: &Repository,
    gateway: &dyn GenerationGateway,
    message: &str,
) -> Result<ChatResponse, AppError> {
    let length = message.chars().count();
    if length == 0 {
        return Err(AppError::Validation("message cannot be empty".to_string()));
    }
    if length > MAX_CHAT_MESSAGE_CHARS {
        return Err(AppError::Validation(format!(
            "message too long (max {} characters)",
            MAX_CHAT_MESSAGE_CHARS
        )));
    }

    let reply = gateway.generate(message).await?;
    if reply.trim().is_empty() {
        tracing::warn!(chars = length, "Empty reply from generation service");
        return Err(AppError::EmptyResponse);
    }

    let conversation = repo
        .create_conversation(
            &ConversationOwner::Legacy,
            LEGACY_CHAT_TITLE,
            vec![Message::user(message), Message::assistant(reply.as_str())],
        )
        .await?;

    Ok(ChatResponse {
        reply,
        id: conversation.id,
        timestamp: conversation.created_at,
    })
}
