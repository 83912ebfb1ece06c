// src/models/quiz.rs

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::{config::DEFAULT_DURATION_MINUTES, services::scoring::ScoringPolicy};

/// Represents the 'quizzes' table in the database.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Quiz {
    pub id: i64,
    pub title: String,
    pub subject: String,

    /// Day the quiz is scheduled for.
    pub quiz_date: NaiveDate,

    pub duration_minutes: i32,

    /// Whether wrong answers deduct `negative_marks` each.
    pub negative_marking: bool,
    pub negative_marks: f64,

    /// Drafts are hidden from students.
    pub is_draft: bool,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Quiz {
    /// Countdown length of a fresh attempt.
    pub fn duration_seconds(&self) -> u32 {
        let minutes = if self.duration_minutes > 0 {
            self.duration_minutes
        } else {
            DEFAULT_DURATION_MINUTES
        };
        minutes as u32 * 60
    }

    pub fn scoring_policy(&self) -> ScoringPolicy {
        ScoringPolicy {
            negative_marking: self.negative_marking,
            penalty: self.negative_marks,
        }
    }
}

/// A quiz row joined with the number of questions it holds.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct QuizListing {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub quiz: Quiz,
    pub question_count: i64,
}

/// Quiz fields accepted from the admin console on create and update.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct QuizDraft {
    #[validate(length(max = 200, message = "Title must be at most 200 characters."))]
    pub title: String,
    #[validate(length(min = 1, max = 100, message = "Subject must be between 1 and 100 characters."))]
    pub subject: String,
    pub quiz_date: NaiveDate,
    #[validate(range(min = 1, max = 600, message = "Duration must be between 1 and 600 minutes."))]
    pub duration_minutes: i32,
    #[serde(default)]
    pub negative_marking: bool,
    #[serde(default)]
    #[validate(range(min = 0.0, max = 10.0, message = "Negative marks must be between 0 and 10."))]
    pub negative_marks: f64,
    #[serde(default)]
    pub is_draft: bool,
}

impl QuizDraft {
    /// Trims the title and zeroes the penalty when negative marking is off.
    pub fn normalized(mut self) -> Self {
        self.title = self.title.trim().to_string();
        self.subject = self.subject.trim().to_string();
        if !self.negative_marking {
            self.negative_marks = 0.0;
        }
        self
    }
}

/// How far the caller got with a published quiz.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QuizProgress {
    NotStarted,
    InProgress { time_left_seconds: i32 },
    Completed { score: i32, total_questions: i32 },
}

/// Dashboard entry: a published quiz and the caller's progress on it.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardQuiz {
    #[serde(flatten)]
    pub listing: QuizListing,
    pub progress: QuizProgress,
}

/// Published quizzes sharing a quiz date.
#[derive(Debug, Clone, Serialize)]
pub struct QuizDay {
    pub date: NaiveDate,
    pub quizzes: Vec<DashboardQuiz>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> QuizDraft {
        QuizDraft {
            title: "  Daily Reasoning  ".to_string(),
            subject: "Reasoning".to_string(),
            quiz_date: NaiveDate::from_ymd_opt(2026, 10, 17).unwrap(),
            duration_minutes: 10,
            negative_marking: false,
            negative_marks: 0.25,
            is_draft: false,
        }
    }

    #[test]
    fn normalized_drops_penalty_without_negative_marking() {
        let d = draft().normalized();
        assert_eq!(d.title, "Daily Reasoning");
        assert_eq!(d.negative_marks, 0.0);
    }

    #[test]
    fn normalized_keeps_penalty_with_negative_marking() {
        let mut d = draft();
        d.negative_marking = true;
        assert_eq!(d.normalized().negative_marks, 0.25);
    }

    #[test]
    fn draft_rejects_zero_duration() {
        let mut d = draft();
        d.duration_minutes = 0;
        assert!(d.validate().is_err());
    }

    #[test]
    fn duration_falls_back_to_ten_minutes() {
        let quiz = Quiz {
            id: 1,
            title: "t".into(),
            subject: "s".into(),
            quiz_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            duration_minutes: 0,
            negative_marking: false,
            negative_marks: 0.0,
            is_draft: false,
            created_at: None,
        };
        assert_eq!(quiz.duration_seconds(), 600);
    }
}
