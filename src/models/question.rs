// src/models/question.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub quiz_id: i64,

    /// 1-based position within the quiz.
    pub sort_order: i32,

    pub question_text: String,

    /// Between two and four option strings, stored as a JSON array.
    pub options: Json<Vec<String>>,

    /// 0-based index into `options`.
    pub correct_option: i32,

    pub solution: String,
    pub solution_image_url: Option<String>,
    pub image_url: Option<String>,
}

impl Question {
    pub fn correct_index(&self) -> Option<usize> {
        usize::try_from(self.correct_option).ok()
    }
}

/// DTO for sending a question to a student (excludes answer and solution).
#[derive(Debug, Clone, Serialize)]
pub struct PublicQuestion {
    pub id: i64,
    pub sort_order: i32,
    pub question_text: String,
    pub options: Vec<String>,
    pub image_url: Option<String>,
}

impl From<&Question> for PublicQuestion {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id,
            sort_order: q.sort_order,
            question_text: q.question_text.clone(),
            options: q.options.0.clone(),
            image_url: q.image_url.clone(),
        }
    }
}

/// A question as entered in the admin console, before it is persisted.
///
/// `id` is set when the question already exists and is being edited.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct QuestionDraft {
    #[serde(default)]
    pub id: Option<i64>,
    pub question_text: String,
    pub options: Vec<String>,
    #[serde(default)]
    pub correct_option: usize,
    #[serde(default)]
    pub solution: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub solution_image_url: Option<String>,
}

/// Row written by `QuizStore::replace_questions`.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionRecord {
    pub id: Option<i64>,
    pub sort_order: i32,
    pub question_text: String,
    pub options: Vec<String>,
    pub correct_option: i32,
    pub solution: String,
    pub solution_image_url: Option<String>,
    pub image_url: Option<String>,
}

impl From<&Question> for QuestionDraft {
    fn from(q: &Question) -> Self {
        Self {
            id: Some(q.id),
            question_text: q.question_text.clone(),
            options: q.options.0.clone(),
            correct_option: q.correct_index().unwrap_or(0),
            solution: q.solution.clone(),
            image_url: q.image_url.clone(),
            solution_image_url: q.solution_image_url.clone(),
        }
    }
}
