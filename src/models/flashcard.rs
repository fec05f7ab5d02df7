//! Flashcard set models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Flashcard {
    pub front: String,
    pub back: String,
}

/// A generated deck. Only ever created or deleted as a whole.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlashcardSet {
    pub id: String,
    pub owner_id: String,
    pub topic: String,
    pub cards: Vec<Flashcard>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_num_cards() -> i64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateFlashcardsRequest {
    pub topic: String,
    #[serde(default = "default_num_cards")]
    pub num_cards: i64,
}

/// Response body of flashcard generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedFlashcards {
    pub id: String,
    pub topic: String,
    pub cards: Vec<Flashcard>,
}

impl From<FlashcardSet> for GeneratedFlashcards {
    fn from(set: FlashcardSet) -> Self {
        Self {
            id: set.id,
            topic: set.topic,
            cards: set.cards,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}
