//! Owner-scoped conversation operations.

use crate::db::Repository;
use crate::errors::AppError;
use crate::models::{
    Conversation, ConversationOwner, CreateConversationRequest, Message,
    DEFAULT_CONVERSATION_TITLE,
};

/// Most attachments one message may carry.
pub const MAX_ATTACHMENTS_PER_MESSAGE: usize = 10;

const MAX_TITLE_CHARS: usize = 200;

/// Conversation store access bound to the configured message cap.
#[derive(Clone)]
pub struct ConversationService {
    repo: Repository,
    max_messages: usize,
}

impl ConversationService {
    pub fn new(repo: Repository, max_messages: usize) -> Self {
        Self { repo, max_messages }
    }

    /// The caller's conversations plus legacy ones, most recently updated first.
    pub async fn list(&self, caller_id: &str) -> Result<Vec<Conversation>, AppError> {
        self.repo.list_conversations(caller_id).await
    }

    pub async fn get(&self, caller_id: &str, id: &str) -> Result<Conversation, AppError> {
        self.repo
            .get_conversation(caller_id, id)
            .await?
            .ok_or_else(|| AppError::NotFound("Conversation not found".to_string()))
    }

    pub async fn create(
        &self,
        caller_id: &str,
        request: CreateConversationRequest,
    ) -> Result<Conversation, AppError> {
        let title = match request.title.as_deref().map(str::trim) {
            Some(title) if !title.is_empty() => check_title(title)?,
            _ => DEFAULT_CONVERSATION_TITLE.to_string(),
        };

        let messages = match request.first_message {
            Some(message) => {
                check_message(&message)?;
                vec![message]
            }
            None => Vec::new(),
        };

        self.repo
            .create_conversation(&ConversationOwner::User(caller_id.to_string()), &title, messages)
            .await
    }

    pub async fn append_message(
        &self,
        caller_id: &str,
        id: &str,
        message: Message,
    ) -> Result<Conversation, AppError> {
        check_message(&message)?;
        self.repo
            .append_message(caller_id, id, &message, self.max_messages)
            .await
    }

    pub async fn rename(
        &self,
        caller_id: &str,
        id: &str,
        title: &str,
    ) -> Result<Conversation, AppError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(AppError::Validation("Title must not be blank".to_string()));
        }
        let title = check_title(title)?;
        self.repo.rename_conversation(caller_id, id, &title).await
    }

    pub async fn delete(&self, caller_id: &str, id: &str) -> Result<(), AppError> {
        self.repo.delete_conversation(caller_id, id).await
    }
}

fn check_title(title: &str) -> Result<String, AppError> {
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(AppError::Validation(format!(
            "Title must be at most {} characters",
            MAX_TITLE_CHARS
        )));
    }
    Ok(title.to_string())
}

fn check_message(message: &Message) -> Result<(), AppError> {
    if message.files.len() > MAX_ATTACHMENTS_PER_MESSAGE {
        return Err(AppError::Validation(format!(
            "A message may carry at most {} attachments",
            MAX_ATTACHMENTS_PER_MESSAGE
        )));
    }
    if message.content.trim().is_empty() && message.files.is_empty() {
        return Err(AppError::Validation(
            "Message needs content or an attachment".to_string(),
        ));
    }
    Ok(())
}
