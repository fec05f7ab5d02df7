//! Client library for the NeoLearn API.
//!
//! Holds the signed-in session across runs and drives chat sends with
//! optimistic local updates that are never rolled back.

mod api;
mod session;
mod store;

pub use api::ApiClient;
pub use session::{ChatSession, Entry, SendState, SessionError, FILES_ONLY_CONTENT};
pub use store::{FileStorage, MemoryStorage, SessionState, SessionStore, StateStorage};

use crate::gateway::GatewayError;

/// Errors raised by client calls and session storage.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport failure or undecodable success body
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with an error body
    #[error("{code} ({status}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// The reply source failed
    #[error(transparent)]
    Generation(#[from] GatewayError),

    /// The reply source answered with nothing but whitespace
    #[error("Empty reply from the generation service")]
    EmptyReply,

    /// A protected endpoint was called with no token in the session
    #[error("Not signed in")]
    NotAuthenticated,

    #[error("Session storage error: {0}")]
    Storage(String),

    #[error("Session state is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
