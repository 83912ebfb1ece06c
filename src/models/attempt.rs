// src/models/attempt.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};
use uuid::Uuid;

/// Stored in `AnswerRecord::selected` when a question was left blank.
pub const UNATTEMPTED: i32 = -1;

/// Per-question line of the answer report kept on an attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question_id: i64,
    /// Selected option index, or `UNATTEMPTED`.
    pub selected: i32,
    pub correct_option: i32,
    pub correct: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerOutcome {
    Correct,
    Incorrect,
    Unattempted,
}

impl AnswerRecord {
    pub fn outcome(&self) -> AnswerOutcome {
        if self.selected == UNATTEMPTED {
            AnswerOutcome::Unattempted
        } else if self.correct {
            AnswerOutcome::Correct
        } else {
            AnswerOutcome::Incorrect
        }
    }
}

/// Represents the 'quiz_attempts' table in the database.
/// One row per (user, quiz) pair.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Attempt {
    pub id: i64,
    pub user_id: Uuid,
    pub quiz_id: i64,
    pub score: i32,
    pub total_questions: i32,
    pub time_taken_seconds: i32,
    pub answers: Json<Vec<AnswerRecord>>,
    pub completed_at: DateTime<Utc>,
}

/// Attempt written at submission; `completed_at` is stamped by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAttempt {
    pub user_id: Uuid,
    pub quiz_id: i64,
    pub score: i32,
    pub total_questions: i32,
    pub time_taken_seconds: i32,
    pub answers: Vec<AnswerRecord>,
}

/// Scored outcome of an attempt as shown on the results screen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptResult {
    pub score: i32,
    pub total_questions: i32,
    pub time_taken_seconds: i32,
    /// `None` for a quiz without questions.
    pub percentage: Option<i32>,
    pub correct: usize,
    pub incorrect: usize,
    pub unattempted: usize,
    pub answers: Vec<AnswerRecord>,
}

impl AttemptResult {
    pub fn from_records(
        score: i32,
        time_taken_seconds: i32,
        total_questions: i32,
        answers: Vec<AnswerRecord>,
    ) -> Self {
        let count = |outcome| answers.iter().filter(|a| a.outcome() == outcome).count();
        Self {
            score,
            total_questions,
            time_taken_seconds,
            percentage: crate::services::scoring::percentage(score, total_questions),
            correct: count(AnswerOutcome::Correct),
            incorrect: count(AnswerOutcome::Incorrect),
            unattempted: count(AnswerOutcome::Unattempted),
            answers,
        }
    }
}

impl From<&Attempt> for AttemptResult {
    fn from(a: &Attempt) -> Self {
        Self::from_records(
            a.score,
            a.time_taken_seconds,
            a.total_questions,
            a.answers.0.clone(),
        )
    }
}

/// Aggregated struct for displaying a leaderboard row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub rank: i64,
    pub user_id: Uuid,
    pub display_name: String,
    pub quiz_id: i64,
    pub score: i32,
    pub total_questions: i32,
    pub time_taken_seconds: i32,
    pub completed_at: DateTime<Utc>,
}

/// The caller's place among everyone who attempted a quiz.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Standing {
    pub rank: i64,
    pub participants: i64,
    pub percentile: f64,
    pub score: i32,
    pub time_taken_seconds: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Leaderboard {
    pub entries: Vec<LeaderboardEntry>,
    pub participants: i64,
    pub me: Option<Standing>,
}

/// One question in the post-attempt solutions review.
#[derive(Debug, Clone, Serialize)]
pub struct SolutionItem {
    pub question: crate::models::question::Question,
    pub answer: Option<AnswerRecord>,
    pub outcome: AnswerOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct SolutionsReview {
    pub quiz: crate::models::quiz::Quiz,
    pub result: AttemptResult,
    pub items: Vec<SolutionItem>,
}
