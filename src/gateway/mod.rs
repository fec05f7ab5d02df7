//! Generation gateway.
//!
//! The text-completion service is an opaque `generate(prompt) -> text` call that
//! may be slow or fail. Handlers only see the [`GenerationGateway`] trait; the
//! production implementation talks to Gemini over HTTPS.

mod decode;
mod gemini;

pub use decode::{decode_items, Decoded};
pub use gemini::GeminiGateway;

use async_trait::async_trait;

/// Error types for gateway calls.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    /// No API key configured
    #[error("Generation service unavailable: {0}")]
    Unavailable(String),

    /// Upstream answered with a non-success status
    #[error("Generation service returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// No answer within the configured timeout
    #[error("Generation service timed out")]
    Timeout,

    /// Connection-level failure
    #[error("Network error: {0}")]
    Network(String),

    /// Upstream body was not the expected envelope
    #[error("Unexpected response from generation service: {0}")]
    Malformed(String),
}

impl GatewayError {
    /// Upstream HTTP status, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Opaque text-completion backend.
#[async_trait]
pub trait GenerationGateway: Send + Sync {
    /// Send a prompt and wait for the full text reply.
    ///
    /// An empty string is a valid reply; callers decide whether that is an error.
    async fn generate(&self, prompt: &str) -> Result<String, GatewayError>;
}
