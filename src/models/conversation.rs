//! Conversation, message and attachment models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Title given to conversations created without one.
pub const DEFAULT_CONVERSATION_TITLE: &str = "New Conversation";

/// Who a conversation belongs to.
///
/// Both conversation writers (the authenticated service and the anonymous
/// chat relay) go through this type, so the ownership rule lives in one place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationOwner {
    User(String),
    /// Created without authentication. Listed for everyone, addressable by no one.
    Legacy,
}

impl ConversationOwner {
    pub fn owner_id(&self) -> Option<&str> {
        match self {
            ConversationOwner::User(id) => Some(id),
            ConversationOwner::Legacy => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A file uploaded ahead of being attached to a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub name: String,
    #[serde(alias = "type")]
    pub mime_type: String,
    #[serde(alias = "size")]
    pub size_bytes: u64,
    pub url: String,
    /// Only set for image mime types
    #[serde(alias = "preview", default, skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
}

/// A single chat message embedded in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub files: Vec<Attachment>,
    #[serde(default = "super::now")]
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            files: Vec::new(),
            timestamp: super::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            files: Vec::new(),
            timestamp: super::now(),
        }
    }

    pub fn with_files(mut self, files: Vec<Attachment>) -> Self {
        self.files = files;
        self
    }
}

/// A conversation with its ordered message history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub owner_id: Option<String>,
    pub title: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Internal version for optimistic concurrency control
    #[serde(skip)]
    pub version: i64,
}

/// Request body for creating a conversation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub first_message: Option<Message>,
}

/// Request body for renaming a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameConversationRequest {
    pub title: String,
}

/// Confirmation returned by conversation deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteConversationResponse {
    pub message: String,
}
