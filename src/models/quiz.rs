//! Quiz generation and attempt history models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored quiz result. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizAttempt {
    pub id: String,
    pub owner_id: String,
    pub topic: String,
    pub score: i64,
    pub total_questions: i64,
    pub created_at: DateTime<Utc>,
}

/// A generated multiple-choice question. Not persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub question: String,
    pub options: [String; 4],
    pub correct_index: u8,
}

impl QuizQuestion {
    pub fn is_well_formed(&self) -> bool {
        usize::from(self.correct_index) < self.options.len() && !self.question.trim().is_empty()
    }
}

fn default_num_questions() -> i64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateQuizRequest {
    pub topic: String,
    #[serde(default = "default_num_questions")]
    pub num_questions: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedQuiz {
    pub topic: String,
    pub questions: Vec<QuizQuestion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitQuizRequest {
    pub topic: String,
    pub total_questions: i64,
    pub correct: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitQuizResponse {
    pub id: String,
    pub score: i64,
}
