//! Data models for the NeoLearn backend.
//!
//! Field names serialize in camelCase to match the browser client.

mod chat;
mod conversation;
mod flashcard;
mod quiz;
mod user;

pub use chat::*;
pub use conversation::*;
pub use flashcard::*;
pub use quiz::*;
pub use user::*;

use chrono::{DateTime, SubsecRound, Utc};

/// Current time truncated to the precision the store keeps.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}
