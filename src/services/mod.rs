//! Domain operations behind the HTTP handlers.
//!
//! Services validate their inputs before touching the store or the
//! generation gateway, and take the caller identity explicitly.

pub mod chat;
pub mod conversations;
pub mod flashcards;
pub mod quiz;

use std::ops::RangeInclusive;

use crate::errors::AppError;

/// Most history rows returned by a list call.
pub const HISTORY_LIMIT: i64 = 100;

/// Trimmed topic, or a validation error when blank.
pub(crate) fn require_topic(topic: &str) -> Result<String, AppError> {
    let topic = topic.trim();
    if topic.is_empty() {
        return Err(AppError::Validation("Topic is required".to_string()));
    }
    Ok(topic.to_string())
}

pub(crate) fn require_in_range(
    field: &str,
    value: i64,
    range: RangeInclusive<i64>,
) -> Result<(), AppError> {
    if !range.contains(&value) {
        return Err(AppError::Validation(format!(
            "{} must be between {} and {}",
            field,
            range.start(),
            range.end()
        )));
    }
    Ok(())
}
