// src/store/mod.rs

//! Persistence API consumed by the quiz core.
//!
//! Every call is asynchronous and may fail; callers never assume ordering
//! between concurrent calls.

pub mod memory;
pub mod objects;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        attempt::{Attempt, NewAttempt},
        profile::Profile,
        question::{Question, QuestionRecord},
        quiz::{Quiz, QuizDraft, QuizListing},
        session::SessionSnapshot,
    },
};

pub use memory::MemoryStore;
pub use objects::{FsObjectStore, MemoryObjectStore, ObjectStore};
pub use postgres::PgStore;

#[async_trait]
pub trait QuizStore: Send + Sync {
    // Quiz
    async fn create_quiz(&self, draft: &QuizDraft) -> Result<Quiz, AppError>;
    /// `NotFound` when the quiz does not exist.
    async fn update_quiz(&self, id: i64, draft: &QuizDraft) -> Result<Quiz, AppError>;
    async fn get_quiz(&self, id: i64) -> Result<Option<Quiz>, AppError>;
    /// Newest quiz date first.
    async fn list_quizzes(
        &self,
        include_drafts: bool,
        limit: Option<i64>,
    ) -> Result<Vec<QuizListing>, AppError>;
    /// Also removes the quiz's questions, attempts and sessions.
    async fn delete_quiz(&self, id: i64) -> Result<bool, AppError>;

    // Question
    /// Ordered by sort index.
    async fn list_questions(&self, quiz_id: i64) -> Result<Vec<Question>, AppError>;
    /// Makes `records` the quiz's whole question set in one transaction:
    /// records carrying an id of this quiz are updated, the rest inserted,
    /// and questions of the quiz not among them are deleted.
    async fn replace_questions(
        &self,
        quiz_id: i64,
        records: &[QuestionRecord],
    ) -> Result<Vec<Question>, AppError>;

    // Attempt
    async fn get_attempt(&self, user_id: Uuid, quiz_id: i64) -> Result<Option<Attempt>, AppError>;
    /// Keyed on (user, quiz); replaces any earlier attempt of the pair.
    async fn upsert_attempt(&self, attempt: &NewAttempt) -> Result<Attempt, AppError>;
    async fn delete_attempt(&self, user_id: Uuid, quiz_id: i64) -> Result<bool, AppError>;
    async fn list_user_attempts(&self, user_id: Uuid) -> Result<Vec<Attempt>, AppError>;
    /// Leaderboard order: score descending, then time ascending.
    async fn top_attempts(&self, quiz_id: i64, limit: i64) -> Result<Vec<Attempt>, AppError>;
    /// Attempts of any quiz completed at or after `since`, leaderboard order.
    async fn attempts_since(
        &self,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Attempt>, AppError>;
    async fn count_attempts(&self, quiz_id: i64) -> Result<i64, AppError>;
    /// Attempts with a greater score, or an equal score and a lower time.
    async fn count_ahead(&self, quiz_id: i64, score: i32, time_taken_seconds: i32)
    -> Result<i64, AppError>;

    // Session
    async fn get_session(&self, user_id: Uuid, quiz_id: i64)
    -> Result<Option<SessionSnapshot>, AppError>;
    /// Last write wins.
    async fn save_session(&self, snapshot: &SessionSnapshot) -> Result<(), AppError>;
    async fn delete_session(&self, user_id: Uuid, quiz_id: i64) -> Result<bool, AppError>;
    async fn list_user_sessions(&self, user_id: Uuid) -> Result<Vec<SessionSnapshot>, AppError>;

    // Profile
    async fn get_profile(&self, id: Uuid) -> Result<Option<Profile>, AppError>;
    async fn profiles_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Profile>, AppError>;
}
