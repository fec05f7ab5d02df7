//! Database repository for CRUD operations.
//!
//! Every read or write that takes an id also filters on the caller's identity.
//! The only exception is the legacy (null-owner) branch of `list_conversations`.

use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use super::{format_timestamp, parse_timestamp};
use crate::errors::{codes, AppError};
use crate::models::{
    now, Conversation, ConversationOwner, Flashcard, FlashcardSet, Message, QuizAttempt,
    UserIdentity,
};

/// How many times an append re-reads the document after losing a race.
const MAX_APPEND_ATTEMPTS: usize = 5;

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ==================== USER OPERATIONS ====================

    /// Insert a user. The email must already be normalized.
    pub async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<UserIdentity, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let created_at = now();

        let result = sqlx::query(
            "INSERT INTO users (id, email, password_hash, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(email)
        .bind(password_hash)
        .bind(format_timestamp(&created_at))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(UserIdentity {
                id,
                email: email.to_string(),
                password_hash: password_hash.to_string(),
                created_at,
            }),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(email_exists())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Find a user by email, case-insensitively.
    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<UserIdentity>, AppError> {
        let row = sqlx::query(
            "SELECT id, email, password_hash, created_at FROM users WHERE email = ? COLLATE NOCASE",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    // ==================== CONVERSATION OPERATIONS ====================

    /// Create a conversation. Both the authenticated service and the anonymous
    /// relay write through here.
    pub async fn create_conversation(
        &self,
        owner: &ConversationOwner,
        title: &str,
        messages: Vec<Message>,
    ) -> Result<Conversation, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let created_at = now();
        let messages_json = serde_json::to_string(&messages)?;

        sqlx::query(
            "INSERT INTO conversations (id, owner_id, title, messages, created_at, updated_at, version) VALUES (?, ?, ?, ?, ?, ?, 1)",
        )
        .bind(&id)
        .bind(owner.owner_id())
        .bind(title)
        .bind(&messages_json)
        .bind(format_timestamp(&created_at))
        .bind(format_timestamp(&created_at))
        .execute(&self.pool)
        .await?;

        Ok(Conversation {
            id,
            owner_id: owner.owner_id().map(str::to_string),
            title: title.to_string(),
            messages,
            created_at,
            updated_at: created_at,
            version: 1,
        })
    }

    /// List the caller's conversations plus all legacy ones, most recently updated first.
    pub async fn list_conversations(&self, caller_id: &str) -> Result<Vec<Conversation>, AppError> {
        let rows = sqlx::query(
            "SELECT id, owner_id, title, messages, created_at, updated_at, version FROM conversations WHERE owner_id = ? OR owner_id IS NULL ORDER BY updated_at DESC, rowid DESC",
        )
        .bind(caller_id)
        .fetch_all(&self.pool)
        .await?;

        let mut conversations = Vec::with_capacity(rows.len());
        for row in &rows {
            match conversation_from_row(row) {
                Ok(conversation) => conversations.push(conversation),
                // A broken shared row must not fail every user's list.
                Err(e) if row.try_get::<Option<String>, _>("owner_id")?.is_none() => {
                    let id: String = row.try_get("id")?;
                    tracing::warn!(conversation_id = %id, "Skipping undecodable legacy conversation: {}", e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(conversations)
    }

    /// Get a conversation owned by the caller. Legacy rows are never returned.
    pub async fn get_conversation(
        &self,
        caller_id: &str,
        id: &str,
    ) -> Result<Option<Conversation>, AppError> {
        let row = sqlx::query(
            "SELECT id, owner_id, title, messages, created_at, updated_at, version FROM conversations WHERE id = ? AND owner_id = ?",
        )
        .bind(id)
        .bind(caller_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(conversation_from_row).transpose()
    }

    /// Append a message to an owned conversation.
    ///
    /// The document is rewritten with a version check. A concurrent append
    /// makes the check fail and the append is replayed on the fresh document,
    /// so neither message is lost.
    pub async fn append_message(
        &self,
        caller_id: &str,
        id: &str,
        message: &Message,
        max_messages: usize,
    ) -> Result<Conversation, AppError> {
        for _ in 0..MAX_APPEND_ATTEMPTS {
            let mut conversation = self
                .get_conversation(caller_id, id)
                .await?
                .ok_or_else(conversation_not_found)?;

            if conversation.messages.len() >= max_messages {
                return Err(AppError::Validation(format!(
                    "Conversation already holds the maximum of {} messages",
                    max_messages
                )));
            }

            conversation.messages.push(message.clone());
            let updated_at = now().max(conversation.created_at);
            let messages_json = serde_json::to_string(&conversation.messages)?;

            let result = sqlx::query(
                "UPDATE conversations SET messages = ?, updated_at = ?, version = version + 1 WHERE id = ? AND owner_id = ? AND version = ?",
            )
            .bind(&messages_json)
            .bind(format_timestamp(&updated_at))
            .bind(id)
            .bind(caller_id)
            .bind(conversation.version)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 1 {
                conversation.updated_at = updated_at;
                conversation.version += 1;
                return Ok(conversation);
            }

            tracing::debug!("Concurrent append on conversation {}, re-reading", id);
        }

        Err(AppError::Conflict {
            code: codes::CONFLICT,
            message: "Conversation is being modified concurrently, try again".to_string(),
        })
    }

    /// Rename an owned conversation.
    pub async fn rename_conversation(
        &self,
        caller_id: &str,
        id: &str,
        title: &str,
    ) -> Result<Conversation, AppError> {
        let existing = self
            .get_conversation(caller_id, id)
            .await?
            .ok_or_else(conversation_not_found)?;
        let updated_at = now().max(existing.created_at);

        let result = sqlx::query(
            "UPDATE conversations SET title = ?, updated_at = ?, version = version + 1 WHERE id = ? AND owner_id = ?",
        )
        .bind(title)
        .bind(format_timestamp(&updated_at))
        .bind(id)
        .bind(caller_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(conversation_not_found());
        }

        self.get_conversation(caller_id, id)
            .await?
            .ok_or_else(conversation_not_found)
    }

    /// Hard-delete an owned conversation.
    pub async fn delete_conversation(&self, caller_id: &str, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM conversations WHERE id = ? AND owner_id = ?")
            .bind(id)
            .bind(caller_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(conversation_not_found());
        }
        Ok(())
    }

    // ==================== QUIZ OPERATIONS ====================

    /// Record a quiz attempt.
    pub async fn insert_quiz_attempt(
        &self,
        caller_id: &str,
        topic: &str,
        score: i64,
        total_questions: i64,
    ) -> Result<QuizAttempt, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let created_at = now();

        sqlx::query(
            "INSERT INTO quiz_attempts (id, owner_id, topic, score, total_questions, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(caller_id)
        .bind(topic)
        .bind(score)
        .bind(total_questions)
        .bind(format_timestamp(&created_at))
        .execute(&self.pool)
        .await?;

        Ok(QuizAttempt {
            id,
            owner_id: caller_id.to_string(),
            topic: topic.to_string(),
            score,
            total_questions,
            created_at,
        })
    }

    /// The caller's most recent attempts, newest first.
    pub async fn list_quiz_attempts(
        &self,
        caller_id: &str,
        limit: i64,
    ) -> Result<Vec<QuizAttempt>, AppError> {
        let rows = sqlx::query(
            "SELECT id, owner_id, topic, score, total_questions, created_at FROM quiz_attempts WHERE owner_id = ? ORDER BY created_at DESC, rowid DESC LIMIT ?",
        )
        .bind(caller_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(quiz_attempt_from_row).collect()
    }

    // ==================== FLASHCARD OPERATIONS ====================

    /// Store a freshly generated flashcard set.
    pub async fn insert_flashcard_set(
        &self,
        caller_id: &str,
        topic: &str,
        cards: Vec<Flashcard>,
    ) -> Result<FlashcardSet, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let created_at = now();
        let cards_json = serde_json::to_string(&cards)?;

        sqlx::query(
            "INSERT INTO flashcard_sets (id, owner_id, topic, cards, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(caller_id)
        .bind(topic)
        .bind(&cards_json)
        .bind(format_timestamp(&created_at))
        .bind(format_timestamp(&created_at))
        .execute(&self.pool)
        .await?;

        Ok(FlashcardSet {
            id,
            owner_id: caller_id.to_string(),
            topic: topic.to_string(),
            cards,
            created_at,
            updated_at: created_at,
        })
    }

    /// The caller's sets, most recently updated first.
    pub async fn list_flashcard_sets(
        &self,
        caller_id: &str,
        limit: i64,
    ) -> Result<Vec<FlashcardSet>, AppError> {
        let rows = sqlx::query(
            "SELECT id, owner_id, topic, cards, created_at, updated_at FROM flashcard_sets WHERE owner_id = ? ORDER BY updated_at DESC, rowid DESC LIMIT ?",
        )
        .bind(caller_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(flashcard_set_from_row).collect()
    }

    /// Delete an owned flashcard set.
    pub async fn delete_flashcard_set(&self, caller_id: &str, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM flashcard_sets WHERE id = ? AND owner_id = ?")
            .bind(id)
            .bind(caller_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Flashcard set not found".to_string()));
        }
        Ok(())
    }
}

fn conversation_not_found() -> AppError {
    AppError::NotFound("Conversation not found".to_string())
}

fn email_exists() -> AppError {
    AppError::Conflict {
        code: codes::EMAIL_EXISTS,
        message: "An account with this email already exists".to_string(),
    }
}

// Helper functions for row conversion

fn user_from_row(row: &SqliteRow) -> Result<UserIdentity, AppError> {
    let created_at: String = row.try_get("created_at")?;
    Ok(UserIdentity {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn conversation_from_row(row: &SqliteRow) -> Result<Conversation, AppError> {
    let messages: String = row.try_get("messages")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;
    Ok(Conversation {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        title: row.try_get("title")?,
        messages: serde_json::from_str(&messages)?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
        version: row.try_get("version")?,
    })
}

fn quiz_attempt_from_row(row: &SqliteRow) -> Result<QuizAttempt, AppError> {
    let created_at: String = row.try_get("created_at")?;
    Ok(QuizAttempt {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        topic: row.try_get("topic")?,
        score: row.try_get("score")?,
        total_questions: row.try_get("total_questions")?,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn flashcard_set_from_row(row: &SqliteRow) -> Result<FlashcardSet, AppError> {
    let cards: String = row.try_get("cards")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;
    Ok(FlashcardSet {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        topic: row.try_get("topic")?,
        cards: serde_json::from_str(&cards)?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database;
    use tempfile::TempDir;

    async fn repo() -> (Repository, TempDir) {
        let dir = TempDir::new().unwrap();
        let pool = init_database(&dir.path().join("test.sqlite")).await.unwrap();
        (Repository::new(pool), dir)
    }

    #[tokio::test]
    async fn test_duplicate_email_any_case_conflicts() {
        let (repo, _dir) = repo().await;
        repo.create_user("ada@example.com", "hash").await.unwrap();

        let err = repo
            .create_user("ADA@example.com", "hash")
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), codes::EMAIL_EXISTS);

        let found = repo.find_user_by_email("Ada@Example.com").await.unwrap();
        assert_eq!(found.unwrap().email, "ada@example.com");
    }

    #[tokio::test]
    async fn test_ownership_filters() {
        let (repo, _dir) = repo().await;
        let mine = repo
            .create_conversation(&ConversationOwner::User("u1".into()), "Mine", vec![])
            .await
            .unwrap();
        let theirs = repo
            .create_conversation(&ConversationOwner::User("u2".into()), "Theirs", vec![])
            .await
            .unwrap();
        let legacy = repo
            .create_conversation(&ConversationOwner::Legacy, "Legacy Chat", vec![])
            .await
            .unwrap();

        let listed: Vec<String> = repo
            .list_conversations("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert!(listed.contains(&mine.id));
        assert!(listed.contains(&legacy.id));
        assert!(!listed.contains(&theirs.id));

        assert!(repo.get_conversation("u1", &theirs.id).await.unwrap().is_none());
        assert!(repo.get_conversation("u1", &legacy.id).await.unwrap().is_none());

        let msg = Message::user("hi");
        assert!(matches!(
            repo.append_message("u1", &legacy.id, &msg, 10).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            repo.rename_conversation("u1", &theirs.id, "x").await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            repo.delete_conversation("u1", &theirs.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_append_respects_cap_and_order() {
        let (repo, _dir) = repo().await;
        let owner = ConversationOwner::User("u1".into());
        let conv = repo
            .create_conversation(&owner, "Cells", vec![Message::user("cells")])
            .await
            .unwrap();

        repo.append_message("u1", &conv.id, &Message::assistant("a"), 3)
            .await
            .unwrap();
        let updated = repo
            .append_message("u1", &conv.id, &Message::user("b"), 3)
            .await
            .unwrap();
        let contents: Vec<&str> = updated.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["cells", "a", "b"]);
        assert!(updated.updated_at >= updated.created_at);

        let err = repo
            .append_message("u1", &conv.id, &Message::user("c"), 3)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_not_lost() {
        let (repo, _dir) = repo().await;
        let conv = repo
            .create_conversation(&ConversationOwner::User("u1".into()), "Race", vec![])
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..4 {
            let repo = repo.clone();
            let id = conv.id.clone();
            handles.push(tokio::spawn(async move {
                repo.append_message("u1", &id, &Message::user(format!("m{}", i)), 100)
                    .await
            }));
        }
        let mut ok = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                ok += 1;
            }
        }

        let stored = repo.get_conversation("u1", &conv.id).await.unwrap().unwrap();
        assert_eq!(stored.messages.len(), ok);
    }

    #[tokio::test]
    async fn test_history_limit_and_order() {
        let (repo, _dir) = repo().await;
        for i in 0..5 {
            repo.insert_quiz_attempt("u1", &format!("t{}", i), 50, 10)
                .await
                .unwrap();
        }
        repo.insert_quiz_attempt("u2", "other", 10, 10).await.unwrap();

        let history = repo.list_quiz_attempts("u1", 3).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].topic, "t4");
        assert!(history.iter().all(|a| a.owner_id == "u1"));
    }

    #[tokio::test]
    async fn test_flashcard_delete_is_owner_scoped() {
        let (repo, _dir) = repo().await;
        let set = repo
            .insert_flashcard_set(
                "u1",
                "Rust",
                vec![Flashcard {
                    front: "borrow".into(),
                    back: "reference".into(),
                }],
            )
            .await
            .unwrap();

        assert!(repo.delete_flashcard_set("u2", &set.id).await.is_err());
        assert_eq!(repo.list_flashcard_sets("u1", 100).await.unwrap().len(), 1);
        repo.delete_flashcard_set("u1", &set.id).await.unwrap();
        assert!(repo.list_flashcard_sets("u1", 100).await.unwrap().is_empty());
    }
}
