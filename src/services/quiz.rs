//! Quiz generation, scoring and attempt history.

use crate::db::Repository;
use crate::errors::AppError;
use crate::gateway::{decode_items, Decoded, GenerationGateway};
use crate::models::{GeneratedQuiz, QuizAttempt, QuizQuestion, SubmitQuizResponse};

use super::{require_in_range, require_topic, HISTORY_LIMIT};

const QUESTION_RANGE: std::ops::RangeInclusive<i64> = 1..=20;

fn quiz_prompt(topic: &str, num_questions: i64) -> String {
    format!(
        "Create {num_questions} multiple-choice questions on the topic \"{topic}\".\n\
         Return only a JSON array. Each element must have the fields: \
         question (string), options (array of exactly 4 strings), \
         correctIndex (integer 0-3)."
    )
}

/// Percentage score, rounding halves up. Callers guarantee `0 <= correct <= total`.
pub fn score(correct: i64, total: i64) -> i64 {
    let (correct, total) = (i128::from(correct), i128::from(total));
    let percent = (correct * 200 + total) / (total * 2);
    percent as i64
}

/// Decode generated questions. One malformed question fails the whole batch.
pub fn decode_questions(text: &str) -> Decoded<QuizQuestion> {
    match decode_items::<QuizQuestion>(text) {
        Decoded::Parsed(questions) => match questions.iter().position(|q| !q.is_well_formed()) {
            Some(index) => Decoded::ParseFailure(format!("question {} is malformed", index)),
            None => Decoded::Parsed(questions),
        },
        failure => failure,
    }
}

/// Generate a quiz. Nothing is stored.
pub async fn generate(
    gateway: &dyn GenerationGateway,
    topic: &str,
    num_questions: i64,
) -> Result<GeneratedQuiz, AppError> {
    let topic = require_topic(topic)?;
    require_in_range("numQuestions", num_questions, QUESTION_RANGE)?;

    let text = gateway.generate(&quiz_prompt(&topic, num_questions)).await?;
    let questions = decode_questions(&text).or_empty("quiz questions");

    Ok(GeneratedQuiz { topic, questions })
}

/// Record a finished attempt and return its score.
pub async fn submit(
    repo: &Repository,
    caller_id: &str,
    topic: &str,
    total_questions: i64,
    correct: i64,
) -> Result<SubmitQuizResponse, AppError> {
    let topic = require_topic(topic)?;
    if total_questions < 1 {
        return Err(AppError::Validation(
            "totalQuestions must be at least 1".to_string(),
        ));
    }
    if correct < 0 || correct > total_questions {
        return Err(AppError::Validation(
            "correct must be between 0 and totalQuestions".to_string(),
        ));
    }

    let attempt = repo
        .insert_quiz_attempt(caller_id, &topic, score(correct, total_questions), total_questions)
        .await?;
    Ok(SubmitQuizResponse {
        id: attempt.id,
        score: attempt.score,
    })
}

pub async fn history(repo: &Repository, caller_id: &str) -> Result<Vec<QuizAttempt>, AppError> {
    repo.list_quiz_attempts(caller_id, HISTORY_LIMIT).await
}
