//! Per-conversation send state and the local message list.

use std::fmt;

use super::{ApiClient, ClientError};
use crate::gateway::GenerationGateway;
use crate::models::{Attachment, Conversation, Message};

/// Stand-in text for a message that only carries attachments.
pub const FILES_ONLY_CONTENT: &str = "Uploaded files";

/// Where a conversation is in its current send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendState {
    Idle,
    Sending,
    Settled,
    Errored,
}

impl fmt::Display for SendState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SendState::Idle => "idle",
            SendState::Sending => "sending",
            SendState::Settled => "settled",
            SendState::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// Every allowed move. Anything else is rejected.
const TRANSITIONS: &[(SendState, SendState)] = &[
    (SendState::Idle, SendState::Sending),
    (SendState::Sending, SendState::Settled),
    (SendState::Sending, SendState::Errored),
    (SendState::Settled, SendState::Sending),
    (SendState::Errored, SendState::Sending),
];

impl SendState {
    pub fn can_transition(self, to: SendState) -> bool {
        TRANSITIONS.contains(&(self, to))
    }

    pub fn transition(self, to: SendState) -> Result<SendState, SessionError> {
        if self.can_transition(to) {
            Ok(to)
        } else {
            Err(SessionError::InvalidTransition { from: self, to })
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid send state transition {from} -> {to}")]
    InvalidTransition { from: SendState, to: SendState },

    #[error(transparent)]
    Client(#[from] ClientError),
}

/// One line of the local conversation view.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Message(Message),
    /// Shown where the assistant reply would have been
    Error(String),
}

/// Local view of one active conversation.
#[derive(Debug, Clone)]
pub struct ChatSession {
    conversation_id: String,
    state: SendState,
    entries: Vec<Entry>,
}

impl ChatSession {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            state: SendState::Idle,
            entries: Vec::new(),
        }
    }

    /// Start from a conversation fetched from the server.
    pub fn from_conversation(conversation: &Conversation) -> Self {
        Self {
            conversation_id: conversation.id.clone(),
            state: SendState::Idle,
            entries: conversation
                .messages
                .iter()
                .cloned()
                .map(Entry::Message)
                .collect(),
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn state(&self) -> SendState {
        self.state
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Enter `Sending` and show the user's message right away.
    pub fn begin_send(&mut self, message: Message) -> Result<(), SessionError> {
        self.state = self.state.transition(SendState::Sending)?;
        self.entries.push(Entry::Message(message));
        Ok(())
    }

    /// Enter `Settled` with the assistant's reply.
    pub fn settle(&mut self, reply: Message) -> Result<(), SessionError> {
        self.state = self.state.transition(SendState::Settled)?;
        self.entries.push(Entry::Message(reply));
        Ok(())
    }

    /// Enter `Errored`. The user's message stays.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), SessionError> {
        self.state = self.state.transition(SendState::Errored)?;
        self.entries.push(Entry::Error(reason.into()));
        Ok(())
    }

    /// Run one full send.
    ///
    /// The user message is shown, stored in the conversation, answered by
    /// `replies`, and the reply stored. The anonymous `/chat` relay is never
    /// used, so nothing from an owned conversation lands in the shared
    /// legacy rows. Any failure along the way leaves the session `Errored`
    /// with an error entry and is returned to the caller.
    pub async fn send(
        &mut self,
        client: &ApiClient,
        replies: &dyn GenerationGateway,
        content: &str,
        files: Vec<Attachment>,
    ) -> Result<Message, SessionError> {
        let content = match content.trim() {
            "" if !files.is_empty() => FILES_ONLY_CONTENT,
            trimmed => trimmed,
        };
        let user_message = Message::user(content).with_files(files);
        self.begin_send(user_message.clone())?;

        match self.exchange(client, replies, &user_message).await {
            Ok(reply) => {
                self.settle(reply.clone())?;
                Ok(reply)
            }
            Err(e) => {
                tracing::warn!(conversation_id = %self.conversation_id, "Send failed: {}", e);
                self.fail(e.to_string())?;
                Err(e.into())
            }
        }
    }

    async fn exchange(
        &self,
        client: &ApiClient,
        replies: &dyn GenerationGateway,
        user_message: &Message,
    ) -> Result<Message, ClientError> {
        client
            .append_message(&self.conversation_id, user_message)
            .await?;
        let text = replies.generate(&user_message.content).await?;
        if text.trim().is_empty() {
            return Err(ClientError::EmptyReply);
        }
        let reply = Message::assistant(text);
        client.append_message(&self.conversation_id, &reply).await?;
        Ok(reply)
    }
}
