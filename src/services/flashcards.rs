//! Flashcard set generation and management.

use crate::db::Repository;
use crate::errors::AppError;
use crate::gateway::{decode_items, Decoded, GenerationGateway};
use crate::models::{Flashcard, FlashcardSet, GeneratedFlashcards};

use super::{require_in_range, require_topic, HISTORY_LIMIT};

const CARD_RANGE: std::ops::RangeInclusive<i64> = 3..=50;

fn flashcard_prompt(topic: &str, num_cards: i64) -> String {
    format!(
        "Generate {num_cards} flashcards for the topic \"{topic}\".\n\
         Return only a JSON array of objects shaped like \
         {{ \"front\": string, \"back\": string }}."
    )
}

/// Decode generated cards. A card with a blank side fails the whole batch.
pub fn decode_cards(text: &str) -> Decoded<Flashcard> {
    match decode_items::<Flashcard>(text) {
        Decoded::Parsed(cards)
            if cards
                .iter()
                .any(|c| c.front.trim().is_empty() || c.back.trim().is_empty()) =>
        {
            Decoded::ParseFailure("card with an empty side".to_string())
        }
        other => other,
    }
}

/// Generate a set and store it straight away, even when decoding produced no cards.
pub async fn generate(
    repo: &Repository,
    gateway: &dyn GenerationGateway,
    caller_id: &str,
    topic: &str,
    num_cards: i64,
) -> Result<GeneratedFlashcards, AppError> {
    let topic = require_topic(topic)?;
    require_in_range("numCards", num_cards, CARD_RANGE)?;

    let text = gateway.generate(&flashcard_prompt(&topic, num_cards)).await?;
    let cards = decode_cards(&text).or_empty("flashcards");

    let set = repo.insert_flashcard_set(caller_id, &topic, cards).await?;
    tracing::info!(set_id = %set.id, cards = set.cards.len(), "Stored flashcard set");
    Ok(set.into())
}

pub async fn list(repo: &Repository, caller_id: &str) -> Result<Vec<FlashcardSet>, AppError> {
    repo.list_flashcard_sets(caller_id, HISTORY_LIMIT).await
}

pub async fn delete(repo: &Repository, caller_id: &str, id: &str) -> Result<(), AppError> {
    repo.delete_flashcard_set(caller_id, id).await
}
